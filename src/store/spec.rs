use crate::error::{EtlError, Result};

/// Parsed object-store location from the CLI.
///
/// ```text
/// s3://digiroad-test-automation-artifact-bucket?region=eu-west-1
/// file:///var/lib/reportetl
/// memory://
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSpec {
    pub scheme: String,
    /// Bucket name; empty for `file://` and `memory://`.
    pub bucket: Option<String>,
    /// Key prefix within the bucket.
    pub prefix: String,
    pub region: Option<String>,
}

impl StoreSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let url = url::Url::parse(spec).map_err(|e| EtlError::InvalidStore {
            spec: spec.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = url.scheme().to_string();
        let bucket = url
            .host_str()
            .filter(|host| !host.is_empty())
            .map(ToString::to_string);
        let prefix = url.path().trim_matches('/').to_string();
        let region = url
            .query_pairs()
            .find(|(k, _)| k == "region")
            .map(|(_, v)| v.to_string());

        if scheme == "s3" && bucket.is_none() {
            return Err(EtlError::InvalidStore {
                spec: spec.to_string(),
                reason: "S3 URL must include a bucket name".to_string(),
            });
        }

        Ok(Self {
            scheme,
            bucket,
            prefix,
            region,
        })
    }

    /// Bucket identifier used in log lines.
    pub fn display_name(&self) -> String {
        match &self.bucket {
            Some(bucket) if self.prefix.is_empty() => format!("{}://{bucket}", self.scheme),
            Some(bucket) => format!("{}://{bucket}/{}", self.scheme, self.prefix),
            None => format!("{}:///{}", self.scheme, self.prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_spec() {
        let spec = StoreSpec::parse("s3://artifact-bucket/nightly").unwrap();
        assert_eq!(spec.scheme, "s3");
        assert_eq!(spec.bucket.as_deref(), Some("artifact-bucket"));
        assert_eq!(spec.prefix, "nightly");
        assert_eq!(spec.region, None);
    }

    #[test]
    fn test_parse_s3_with_region() {
        let spec = StoreSpec::parse("s3://artifact-bucket?region=eu-west-1").unwrap();
        assert_eq!(spec.region.as_deref(), Some("eu-west-1"));
        assert_eq!(spec.prefix, "");
        assert_eq!(spec.display_name(), "s3://artifact-bucket");
    }

    #[test]
    fn test_parse_file_spec() {
        let spec = StoreSpec::parse("file:///tmp/reportetl").unwrap();
        assert_eq!(spec.scheme, "file");
        assert!(spec.bucket.is_none());
        assert_eq!(spec.prefix, "tmp/reportetl");
    }

    #[test]
    fn test_s3_without_bucket_rejected() {
        let err = StoreSpec::parse("s3:///prefix").unwrap_err();
        assert!(matches!(err, EtlError::InvalidStore { .. }));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(StoreSpec::parse("not a url").is_err());
    }
}
