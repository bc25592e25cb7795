//! Classify input/output locators into spout and state configurations.

use serde::Serialize;
use squall_core::ResolvedSettings;

/// Where an input boundary starts reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OffsetPolicy {
    Earliest,
    Latest,
    Explicit(String),
    /// Leave the offset unset: the framework resumes from the last committed
    /// position, or from the latest one if none exists.
    Resume,
}

impl OffsetPolicy {
    /// Value of `wukong.input.kafka.offset`; `None` for [`OffsetPolicy::Resume`].
    pub fn kafka_offset(&self) -> Option<&str> {
        match self {
            OffsetPolicy::Earliest => Some("-2"),
            OffsetPolicy::Latest => Some("-1"),
            OffsetPolicy::Explicit(marker) => Some(marker),
            OffsetPolicy::Resume => None,
        }
    }

    /// Value of `wukong.input.blob.start`.
    pub fn blob_start(&self) -> &'static str {
        match self {
            OffsetPolicy::Earliest => "EARLIEST",
            OffsetPolicy::Latest => "LATEST",
            OffsetPolicy::Explicit(_) => "EXPLICIT",
            OffsetPolicy::Resume => "RESUME",
        }
    }

}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SpoutConfig {
    Kafka {
        topic: String,
        partitions: Option<String>,
        batch_size: Option<String>,
        parallelism: Option<String>,
        offset_policy: OffsetPolicy,
    },
    /// `marker` is the raw `--offset`, kept even when another start policy wins.
    FileBlob {
        path: String,
        start_policy: OffsetPolicy,
        marker: Option<String>,
    },
    S3Blob {
        bucket: String,
        path: String,
        access_key: Option<String>,
        secret_key: Option<String>,
        region: Option<String>,
        endpoint: Option<&'static str>,
        start_policy: OffsetPolicy,
        marker: Option<String>,
    },
}

impl SpoutConfig {
    pub fn is_kafka(&self) -> bool {
        matches!(self, SpoutConfig::Kafka { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StateConfig {
    Kafka { topic: String },
}

/// The pieces of a `scheme://host/path` locator. `None` when the locator has
/// no scheme at all.
fn split_uri(locator: &str) -> Option<(&str, &str, &str)> {
    let (scheme, rest) = locator.split_once("://")?;
    let (host, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    Some((scheme, host, path))
}

/// `s3://` → S3 blob, `file://` → file blob, anything else is a Kafka topic.
pub fn resolve_spout(input: &str, settings: &ResolvedSettings) -> SpoutConfig {
    let owned = |key: &str| settings.get(key).map(str::to_string);
    match split_uri(input) {
        Some((scheme, host, path)) if scheme.eq_ignore_ascii_case("s3") => {
            let region = owned("aws_region");
            SpoutConfig::S3Blob {
                bucket: host.to_string(),
                path: path.trim_start_matches('/').to_string(),
                access_key: owned("aws_key"),
                secret_key: owned("aws_secret"),
                endpoint: region.as_deref().and_then(s3_endpoint),
                region,
                start_policy: resolve_offset_policy(settings),
                marker: owned("offset"),
            }
        }
        Some((scheme, _, path)) if scheme.eq_ignore_ascii_case("file") => {
            SpoutConfig::FileBlob {
                path: path.to_string(),
                start_policy: resolve_offset_policy(settings),
                marker: owned("offset"),
            }
        }
        _ => SpoutConfig::Kafka {
            topic: input.to_string(),
            partitions: owned("kafka_partitions"),
            batch_size: owned("kafka_batch"),
            parallelism: owned("input_parallelism"),
            offset_policy: resolve_offset_policy(settings),
        },
    }
}

/// First match wins: `from_beginning`, `from_end`, `offset`, else resume.
pub fn resolve_offset_policy(settings: &ResolvedSettings) -> OffsetPolicy {
    if settings.flag("from_beginning") {
        OffsetPolicy::Earliest
    } else if settings.flag("from_end") {
        OffsetPolicy::Latest
    } else if let Some(marker) = settings.get("offset") {
        OffsetPolicy::Explicit(marker.to_string())
    } else {
        OffsetPolicy::Resume
    }
}

/// Output is always Kafka-backed; the locator is the topic name verbatim.
pub fn resolve_state(output: &str) -> StateConfig {
    StateConfig::Kafka { topic: output.to_string() }
}

/// S3 endpoint for a region identifier.
pub fn s3_endpoint(region: &str) -> Option<&'static str> {
    match region {
        "us-east-1" => Some("s3.amazonaws.com"),
        "us-west-1" => Some("s3-us-west-1.amazonaws.com"),
        "us-west-2" => Some("s3-us-west-2.amazonaws.com"),
        "eu-west-1" => Some("s3-eu-west-1.amazonaws.com"),
        r if r.contains("EU") => Some("s3-eu-west-1.amazonaws.com"),
        "ap-southeast-1" => Some("s3-ap-southeast-1.amazonaws.com"),
        "ap-southeast-2" => Some("s3-ap-southeast-2.amazonaws.com"),
        "ap-northeast-1" => Some("s3-ap-northeast-1.amazonaws.com"),
        "sa-east-1" => Some("s3-sa-east-1.amazonaws.com"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squall_core::REGISTRY;

    fn settings(pairs: &[(&str, &str)]) -> ResolvedSettings {
        ResolvedSettings::resolve_with(&REGISTRY, Some("identity".into()), pairs.iter().copied(), |_| None)
    }

    #[test]
    fn every_scheme_maps_to_exactly_one_variant() {
        let s = settings(&[]);
        assert!(matches!(resolve_spout("s3://bucket/key", &s), SpoutConfig::S3Blob { .. }));
        assert!(matches!(resolve_spout("file:///foo/bar", &s), SpoutConfig::FileBlob { .. }));
        assert!(matches!(resolve_spout("topicA", &s), SpoutConfig::Kafka { .. }));
        assert!(matches!(resolve_spout("http://example.com/x", &s), SpoutConfig::Kafka { .. }));
        assert!(matches!(resolve_spout("", &s), SpoutConfig::Kafka { .. }));
    }

    #[test]
    fn s3_locator_splits_bucket_and_path() {
        let s = settings(&[("aws_key", "key"), ("aws_secret", "secret")]);
        match resolve_spout("s3://foo/bar/baz", &s) {
            SpoutConfig::S3Blob { bucket, path, access_key, secret_key, endpoint, .. } => {
                assert_eq!(bucket, "foo");
                assert_eq!(path, "bar/baz");
                assert_eq!(access_key.as_deref(), Some("key"));
                assert_eq!(secret_key.as_deref(), Some("secret"));
                assert_eq!(endpoint, Some("s3.amazonaws.com"));
            }
            other => panic!("unexpected spout {other:?}"),
        }
    }

    #[test]
    fn s3_locator_without_path_has_empty_path() {
        match resolve_spout("s3://foo", &settings(&[])) {
            SpoutConfig::S3Blob { bucket, path, .. } => {
                assert_eq!(bucket, "foo");
                assert!(path.is_empty());
            }
            other => panic!("unexpected spout {other:?}"),
        }
    }

    #[test]
    fn file_locator_keeps_absolute_path() {
        match resolve_spout("file:///foo/bar", &settings(&[])) {
            SpoutConfig::FileBlob { path, start_policy, marker } => {
                assert_eq!(path, "/foo/bar");
                assert_eq!(start_policy, OffsetPolicy::Resume);
                assert_eq!(marker, None);
            }
            other => panic!("unexpected spout {other:?}"),
        }
    }

    #[test]
    fn offset_policy_first_match_wins() {
        assert_eq!(resolve_offset_policy(&settings(&[])), OffsetPolicy::Resume);
        assert_eq!(resolve_offset_policy(&settings(&[("offset", "1234")])), OffsetPolicy::Explicit("1234".into()));
        assert_eq!(resolve_offset_policy(&settings(&[("from_end", "true"), ("offset", "1")])), OffsetPolicy::Latest);
        assert_eq!(
            resolve_offset_policy(&settings(&[("from_beginning", "true"), ("from_end", "true")])),
            OffsetPolicy::Earliest
        );
    }

    #[test]
    fn offset_policy_renders_both_dialects() {
        assert_eq!(OffsetPolicy::Earliest.kafka_offset(), Some("-2"));
        assert_eq!(OffsetPolicy::Latest.kafka_offset(), Some("-1"));
        assert_eq!(OffsetPolicy::Resume.kafka_offset(), None);
        let explicit = OffsetPolicy::Explicit("bing-1".into());
        assert_eq!(explicit.blob_start(), "EXPLICIT");
        assert_eq!(explicit.kafka_offset(), Some("bing-1"));
    }

    #[test]
    fn s3_endpoint_is_defined_only_for_known_regions() {
        for region in ["us-east-1", "us-west-1", "us-west-2", "eu-west-1", "ap-southeast-1", "ap-southeast-2", "ap-northeast-1", "sa-east-1"] {
            assert!(s3_endpoint(region).is_some(), "{region}");
        }
        assert_eq!(s3_endpoint("EU"), Some("s3-eu-west-1.amazonaws.com"));
        assert_eq!(s3_endpoint("us-east-7"), None);
        assert_eq!(s3_endpoint(""), None);
    }

    #[test]
    fn state_uses_output_verbatim() {
        assert_eq!(resolve_state("bar"), StateConfig::Kafka { topic: "bar".into() });
    }
}
