use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// 统一的应用错误类型
/// Unified application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(#[from] crate::comm::config::ConfigError),

    #[error("{message}")]
    Unauthenticated { message: String },

    #[error("{message}")]
    Forbidden { message: String },

    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("Too many requests. Please try again in {retry_after_secs} seconds.")]
    RateLimited { retry_after_secs: u64 },

    #[error("数据库错误: {message}")]
    Database { message: String },

    #[error("外部服务错误: {service}: {message}")]
    ExternalService { service: String, message: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("内部错误: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// 创建认证错误
    pub fn unauthenticated<T: Into<String>>(message: T) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// 创建权限错误
    pub fn forbidden<T: Into<String>>(message: T) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// 创建验证错误
    pub fn validation<T: Into<String>, U: Into<String>>(field: T, message: U) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建数据库错误
    pub fn database<T: Into<String>>(message: T) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// 创建外部服务错误
    pub fn external_service<T: Into<String>, U: Into<String>>(service: T, message: U) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// 创建资源未找到错误
    pub fn not_found<T: Into<String>>(resource: T) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 获取错误代码
    pub fn error_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 1001,
            AppError::Unauthenticated { .. } => 1002,
            AppError::Forbidden { .. } => 1003,
            AppError::Validation { .. } => 1004,
            AppError::RateLimited { .. } => 1005,
            AppError::Database { .. } => 1006,
            AppError::ExternalService { .. } => 1007,
            AppError::NotFound { .. } => 1009,
            AppError::Internal(_) => 1000,
        }
    }

    /// 错误类型名（写入响应体）
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Config(_) => "Config",
            AppError::Unauthenticated { .. } => "Unauthenticated",
            AppError::Forbidden { .. } => "Forbidden",
            AppError::Validation { .. } => "Validation",
            AppError::RateLimited { .. } => "RateLimited",
            AppError::Database { .. } => "Database",
            AppError::ExternalService { .. } => "ExternalService",
            AppError::NotFound { .. } => "NotFound",
            AppError::Internal(_) => "Internal",
        }
    }

    /// 对调用方可见的消息；服务端故障不泄露细节
    /// Caller-visible message; server-side failures stay generic
    pub fn public_message(&self) -> String {
        match self {
            AppError::Config(_) | AppError::Database { .. } | AppError::Internal(_) => {
                "An unexpected error occurred".to_string()
            }
            AppError::ExternalService { service, .. } => {
                format!("Upstream service '{}' is unavailable", service)
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // 记录错误日志
        match self {
            AppError::Internal(_) | AppError::Database { .. } | AppError::Config(_) => {
                tracing::error!("Internal error: {}", self);
            }
            AppError::ExternalService { .. } => {
                tracing::warn!("External service error: {}", self);
            }
            _ => {
                tracing::info!("Client error: {}", self);
            }
        }

        let mut builder = HttpResponse::build(status);
        if let AppError::RateLimited { retry_after_secs } = self {
            builder.insert_header(("Retry-After", retry_after_secs.to_string()));
        }

        builder.json(json!({
            "success": false,
            "message": self.public_message(),
            "error": {
                "code": self.error_code(),
                "type": self.error_type(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(AppError::validation("content", "too long").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::not_found("User").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::forbidden("closed").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::RateLimited { retry_after_secs: 3 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AppError::unauthenticated("no").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::external_service("relay", "down").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = AppError::database("password authentication failed for user nymity");
        assert_eq!(err.public_message(), "An unexpected error occurred");
    }

    #[actix_web::test]
    async fn test_rate_limited_response_carries_retry_after() {
        let resp = AppError::RateLimited { retry_after_secs: 42 }.error_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("Retry-After").unwrap(), "42");

        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["type"], "RateLimited");
        assert!(value["message"].as_str().unwrap().contains("42 seconds"));
    }
}
