//! JWT 鉴权
//!
//! 从 `Authorization: Bearer <token>` 中取出 HS256 签名的 JWT，
//! 校验后以 `sub` 作为用户 ID。

use crate::server::error::ApiError;
use crate::server::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// JWT 载荷
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// 用户 ID
    pub sub: String,
    /// 过期时间（Unix 秒）
    pub exp: usize,
}

/// 已通过鉴权的用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// 取出 Bearer token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 校验 token 并返回载荷
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|decoded| decoded.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ApiError::TokenExpired,
            _ => {
                tracing::debug!(error = ?e, "JWT 校验失败");
                ApiError::Unauthorized
            }
        })
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.jwt_secret.as_deref() else {
            tracing::warn!("收到需要鉴权的请求，但未配置 JWT_SECRET");
            return Err(ApiError::AuthNotConfigured);
        };

        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let claims = verify_token(token, secret)?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
        })
    }
}
