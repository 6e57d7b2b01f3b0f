//! RPC 错误分类
//!
//! 先看结构化信号（HTTP 状态码、JSON-RPC 错误码、reqwest 错误标志），
//! 都无法判断时才由 [`classify_message`] 按子串兜底。

use reqwest::StatusCode;

use crate::error::{RpcError, RpcErrorKind};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const BLOCK_CLEANED_UP: i64 = -32001;
pub const SEND_TRANSACTION_PREFLIGHT_FAILURE: i64 = -32002;
pub const TRANSACTION_SIGNATURE_VERIFICATION_FAILURE: i64 = -32003;
pub const BLOCK_NOT_AVAILABLE: i64 = -32004;
pub const NODE_UNHEALTHY: i64 = -32005;
pub const SLOT_SKIPPED: i64 = -32007;
pub const MIN_CONTEXT_SLOT_NOT_REACHED: i64 = -32016;
pub const PROVIDER_RATE_LIMITED: i64 = -32429;

pub fn json_rpc_code_meaning(code: i64) -> &'static str {
    match code {
        PARSE_ERROR => "Parse error",
        INVALID_REQUEST => "Invalid Request",
        METHOD_NOT_FOUND => "Method not found",
        INVALID_PARAMS => "Invalid params",
        INTERNAL_ERROR => "Internal error",
        SEND_TRANSACTION_PREFLIGHT_FAILURE => "Transaction simulation failed",
        NODE_UNHEALTHY => "Node is unhealthy",
        -32099..=-32000 => "Server error",
        _ => "Unknown error",
    }
}

/// 分类 200 响应中携带的 JSON-RPC 错误对象
pub fn classify_rpc_error(code: i64, message: &str) -> RpcError {
    let kind = match code {
        PARSE_ERROR | INVALID_REQUEST | METHOD_NOT_FOUND | INVALID_PARAMS => {
            RpcErrorKind::InvalidParams
        }
        SEND_TRANSACTION_PREFLIGHT_FAILURE | TRANSACTION_SIGNATURE_VERIFICATION_FAILURE => {
            RpcErrorKind::PreflightFailure
        }
        BLOCK_CLEANED_UP
        | BLOCK_NOT_AVAILABLE
        | NODE_UNHEALTHY
        | SLOT_SKIPPED
        | MIN_CONTEXT_SLOT_NOT_REACHED
        | INTERNAL_ERROR => RpcErrorKind::Network,
        PROVIDER_RATE_LIMITED | 429 => RpcErrorKind::RateLimited,
        _ => classify_message(message),
    };
    RpcError::new(kind, format!("{} ({})", message, json_rpc_code_meaning(code))).with_code(code)
}

/// 分类非成功的 HTTP 状态码
pub fn classify_http_status(status: StatusCode, body: &str) -> RpcError {
    let kind = if status == StatusCode::TOO_MANY_REQUESTS {
        RpcErrorKind::RateLimited
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        RpcErrorKind::Timeout
    } else if status.is_server_error() {
        RpcErrorKind::Network
    } else if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
        RpcErrorKind::InvalidParams
    } else {
        classify_message(body)
    };
    RpcError::new(kind, format!("HTTP {}: {}", status.as_u16(), truncate(body, 256)))
}

/// 分类传输层错误
pub fn classify_transport(err: &reqwest::Error) -> RpcError {
    let kind = if err.is_timeout() {
        RpcErrorKind::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        RpcErrorKind::Network
    } else if err.is_decode() {
        RpcErrorKind::Network
    } else {
        classify_message(&err.to_string())
    };
    RpcError::new(kind, format!("transport error: {}", err))
}

/// 兜底：对错误文本做子串匹配
pub fn classify_message(message: &str) -> RpcErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429")
        || lower.contains("too many requests")
        || lower.contains("rate limit")
    {
        RpcErrorKind::RateLimited
    } else if lower.contains("timeout") || lower.contains("timed out") {
        RpcErrorKind::Timeout
    } else if lower.contains("preflight") || lower.contains("simulation failed") {
        RpcErrorKind::PreflightFailure
    } else if lower.contains("invalid param")
        || lower.contains("invalid argument")
        || lower.contains("wrongsize")
        || lower.contains("invalid base58")
    {
        RpcErrorKind::InvalidParams
    } else {
        RpcErrorKind::Network
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_codes_win() {
        // 文本像限流，但错误码说不是
        let err = classify_rpc_error(INVALID_PARAMS, "too many requests");
        assert_eq!(err.kind, RpcErrorKind::InvalidParams);
        assert_eq!(err.code, Some(INVALID_PARAMS));

        let err = classify_rpc_error(SEND_TRANSACTION_PREFLIGHT_FAILURE, "whatever");
        assert_eq!(err.kind, RpcErrorKind::PreflightFailure);

        let err = classify_rpc_error(NODE_UNHEALTHY, "Node is behind by 42 slots");
        assert_eq!(err.kind, RpcErrorKind::Network);
    }

    #[test]
    fn test_http_status() {
        assert_eq!(
            classify_http_status(StatusCode::TOO_MANY_REQUESTS, "").kind,
            RpcErrorKind::RateLimited
        );
        assert_eq!(
            classify_http_status(StatusCode::BAD_GATEWAY, "").kind,
            RpcErrorKind::Network
        );
        assert_eq!(
            classify_http_status(StatusCode::GATEWAY_TIMEOUT, "").kind,
            RpcErrorKind::Timeout
        );
    }

    #[test]
    fn test_message_fallback() {
        assert_eq!(classify_message("Rate limit exceeded"), RpcErrorKind::RateLimited);
        assert_eq!(classify_message("request timed out"), RpcErrorKind::Timeout);
        assert_eq!(
            classify_message("Transaction simulation failed: blockhash not found"),
            RpcErrorKind::PreflightFailure
        );
        assert_eq!(classify_message("Invalid param: WrongSize"), RpcErrorKind::InvalidParams);
        assert_eq!(classify_message("connection reset"), RpcErrorKind::Network);
        assert_eq!(
            classify_rpc_error(-32099, "rate limit reached").kind,
            RpcErrorKind::RateLimited
        );
    }
}
