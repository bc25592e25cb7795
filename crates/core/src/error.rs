use thiserror::Error;

/// A precondition that failed before any external side effect happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("provide a processor or dataflow to run (positional DATAFLOW, --run) or an explicit --bolt_command")]
    MissingWorker,
    #[error("unknown dataflow or processor '{0}': the worker cannot run it (pass --bolt_command to run something else)")]
    UnknownDataflow(String),
    #[error("a topology --name is required when only --bolt_command is given")]
    MissingTopologyName,
    #[error("an --input locator is required")]
    MissingInput,
    #[error("an --output topic is required")]
    MissingOutput,
    #[error("--kafka_hosts is required when reading input from Kafka")]
    MissingKafkaHosts,
    #[error("a path is required for file input (file:///path)")]
    MissingFilePath,
    #[error("an S3 bucket is required for S3 input (s3://bucket/path)")]
    MissingS3Bucket,
    #[error("an S3 path is required for S3 input (s3://bucket/path)")]
    MissingS3Path,
    #[error("an AWS access key (--aws_key) is required for S3 input")]
    MissingAwsKey,
    #[error("an AWS secret key (--aws_secret) is required for S3 input")]
    MissingAwsSecret,
    #[error("unrecognized AWS region '{0}' (--aws_region): no known S3 endpoint")]
    UnknownAwsRegion(String),
    #[error("invalid value for --{key}: '{value}' ({reason})")]
    InvalidValue { key: String, value: String, reason: String },
}
