use std::fmt;

/// Identity of one pool: `providerId + ("Large"|"") + region`.
///
/// One `PoolManager` exists per `PoolId`; the string form is also the
/// partition key stored in `VmRecord::pool` and the tag-filter prefix the
/// provider adapter's `list_vms` call uses during reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolId {
    pub provider_id: String,
    pub large: bool,
    pub region: String,
}

impl PoolId {
    pub fn new(provider_id: impl Into<String>, large: bool, region: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            large,
            region: region.into(),
        }
    }

    /// Recover `(provider_id, large, region)` from the concatenated form.
    ///
    /// The concatenation is ambiguous in principle (provider ids and region
    /// names could themselves contain "Large"), so this only works reliably
    /// when `provider_id` is passed in alongside the full string, which is
    /// how every call site in this crate actually uses it: the provider id
    /// is already known from configuration, only the `large`/`region` split
    /// needs recovering.
    pub fn parse(full: &str, provider_id: &str) -> Option<Self> {
        let rest = full.strip_prefix(provider_id)?;
        if let Some(region) = rest.strip_prefix("Large") {
            Some(Self::new(provider_id, true, region))
        } else {
            Some(Self::new(provider_id, false, rest))
        }
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.provider_id,
            if self.large { "Large" } else { "" },
            self.region
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_spec_concatenation() {
        let id = PoolId::new("aws", false, "us-east-1");
        assert_eq!(id.to_string(), "awsus-east-1");

        let large = PoolId::new("aws", true, "us-east-1");
        assert_eq!(large.to_string(), "awsLargeus-east-1");
    }

    #[test]
    fn parse_round_trips_through_display() {
        let id = PoolId::new("aws", true, "us-east-1");
        let parsed = PoolId::parse(&id.to_string(), "aws").unwrap();
        assert_eq!(parsed, id);

        let id = PoolId::new("gcp", false, "europe-west1");
        let parsed = PoolId::parse(&id.to_string(), "gcp").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_rejects_mismatched_provider() {
        let id = PoolId::new("aws", false, "us-east-1");
        assert!(PoolId::parse(&id.to_string(), "gcp").is_none());
    }
}
