use thiserror::Error;

/// The stable error taxonomy shared by every core component.
///
/// Each variant carries exactly the information the HTTP boundary needs to
/// pick a status code and a stable `error` code; nothing upstream of that
/// boundary should match on HTTP concepts directly.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing instance id")]
    MissingInstanceId,

    #[error("invalid instance id")]
    InvalidInstanceId,

    #[error("device not found")]
    InstanceNotFound,

    #[error("device not active")]
    InstanceNotActive,

    #[error("instance already exists")]
    InstanceAlreadyExists,

    #[error("container unreachable")]
    ContainerUnreachable,

    #[error("container error: {0}")]
    ContainerError(String),

    #[error("proxy error: {0}")]
    ProxyError(String),

    #[error("no free ports available")]
    PortsExhausted,

    #[error("missing credentials")]
    MissingCredentials,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("authentication error: {0}")]
    AuthError(String),

    #[error("request timed out")]
    Timeout,

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The stable machine-readable code carried in the error envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInstanceId => "MISSING_INSTANCE_ID",
            Self::InvalidInstanceId => "INVALID_INSTANCE_ID",
            Self::InstanceNotFound => "DEVICE_NOT_FOUND",
            Self::InstanceNotActive => "DEVICE_NOT_ACTIVE",
            Self::InstanceAlreadyExists => "CONFLICT",
            Self::ContainerUnreachable => "CONTAINER_UNREACHABLE",
            Self::ContainerError(_) => "CONTAINER_ERROR",
            Self::ProxyError(_) => "PROXY_ERROR",
            Self::PortsExhausted => "PORTS_EXHAUSTED",
            Self::MissingCredentials => "MISSING_CREDENTIALS",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AuthError(_) => "AUTH_ERROR",
            Self::Timeout => "REQUEST_TIMEOUT",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingInstanceId
            | Self::InvalidInstanceId
            | Self::InstanceNotActive
            | Self::ValidationError(_) => 400,
            Self::MissingCredentials | Self::InvalidCredentials | Self::AuthError(_) => 401,
            Self::InstanceNotFound => 404,
            Self::Timeout => 408,
            Self::InstanceAlreadyExists => 409,
            Self::ContainerUnreachable | Self::ContainerError(_) => 503,
            Self::ProxyError(_) | Self::PortsExhausted | Self::Internal(_) => 500,
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        Self::internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
