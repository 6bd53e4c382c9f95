//! 请求参数提取模块
//!
//! 把查询字符串和请求体（JSON 或表单）合并成一张扁平的字符串参数表，
//! 同名字段以请求体为准。API 令牌中间件和登录处理器共用这套规则。

use crate::otp_auth::error::AuthError;
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{FromRequest, Request},
    http::{header, HeaderMap, Uri},
};
use std::collections::HashMap;
use tracing::warn;

/// 扁平参数表
pub type Params = HashMap<String, String>;

/// 为读取参数而缓冲的请求体上限
pub const MAX_BUFFERED_BODY: usize = 64 * 1024;

/// 请求体格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
    /// 其他格式或没有 Content-Type，不读取请求体
    Other,
}

impl BodyKind {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if content_type.starts_with("application/json") {
            BodyKind::Json
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            BodyKind::Form
        } else {
            BodyKind::Other
        }
    }
}

/// 解析查询字符串
pub fn query_params(uri: &Uri) -> Params {
    uri.query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// 解析请求体
///
/// JSON 只取顶层对象中的标量字段（数字和布尔值转成字符串）；
/// 无法解析的请求体视为没有参数。
pub fn body_params(kind: BodyKind, body: &[u8]) -> Params {
    match kind {
        BodyKind::Json => match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .filter_map(|(key, value)| {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        _ => return None,
                    };
                    Some((key, value))
                })
                .collect(),
            _ => Params::new(),
        },
        BodyKind::Form => url::form_urlencoded::parse(body).into_owned().collect(),
        BodyKind::Other => Params::new(),
    }
}

/// 缓冲请求体
///
/// 超过 [`MAX_BUFFERED_BODY`] 时返回 `PayloadTooLarge`
pub async fn buffer_body(headers: &HeaderMap, body: Body) -> Result<Bytes, AuthError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > MAX_BUFFERED_BODY) {
        warn!("Request body too large: content-length={:?}", declared);
        return Err(AuthError::PayloadTooLarge);
    }

    to_bytes(body, MAX_BUFFERED_BODY).await.map_err(|e| {
        warn!("Failed to buffer request body: {}", e);
        AuthError::PayloadTooLarge
    })
}

/// 读取请求参数，并把请求体原样放回请求中交给下游
pub async fn read_params(request: Request) -> Result<(Params, Request), AuthError> {
    let (parts, body) = request.into_parts();
    let mut params = query_params(&parts.uri);

    let request = match BodyKind::from_headers(&parts.headers) {
        BodyKind::Other => Request::from_parts(parts, body),
        kind => {
            let bytes = buffer_body(&parts.headers, body).await?;
            params.extend(body_params(kind, &bytes));
            Request::from_parts(parts, Body::from(bytes))
        }
    };

    Ok((params, request))
}

/// 请求参数提取器
///
/// 提取失败（请求体过大）时返回 JSON 错误响应
#[derive(Debug, Clone, Default)]
pub struct RequestParams(pub Params);

#[axum::async_trait]
impl<S> FromRequest<S> for RequestParams
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(request: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let (params, _) = read_params(request).await?;
        Ok(RequestParams(params))
    }
}
