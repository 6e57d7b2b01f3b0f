use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::error::{RpcError, RpcErrorKind};
use crate::rpc::gateway::RpcGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Unhealthy,
}

/// 节点健康检查结果
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub endpoint: String,
    pub error: Option<RpcErrorKind>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

impl RpcGateway {
    /// 健康检查：一次 getLatestBlockhash，短超时，不重试
    pub async fn get_health(&self) -> HealthReport {
        self.check_endpoint(self.endpoint()).await
    }

    /// 检查备用节点
    pub async fn get_fallback_health(&self) -> Option<HealthReport> {
        let fallback = self.fallback_endpoint()?.to_string();
        Some(self.check_endpoint(&fallback).await)
    }

    async fn check_endpoint(&self, url: &str) -> HealthReport {
        let started = Instant::now();
        let params = json!([{"commitment": "processed"}]);
        let outcome = tokio::time::timeout(
            self.health_timeout,
            self.send_request(url, "getLatestBlockhash", &params),
        )
        .await
        .unwrap_or_else(|_| Err(RpcError::new(RpcErrorKind::Timeout, "health check timed out")));
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(_) => HealthReport {
                status: HealthStatus::Ok,
                latency_ms,
                endpoint: url.to_string(),
                error: None,
                checked_at: Utc::now(),
            },
            Err(err) => {
                warn!(endpoint = url, latency_ms, "health check failed: {}", err);
                HealthReport {
                    status: HealthStatus::Unhealthy,
                    latency_ms,
                    endpoint: url.to_string(),
                    error: Some(err.kind),
                    checked_at: Utc::now(),
                }
            }
        }
    }
}

/// 每隔 `interval` 执行一次 [`RpcGateway::get_health`]，直到 `cancel` 触发
///
/// 最新结果发布在返回的 watch 通道上，第一次检查立即执行
pub fn spawn_health_check(
    gateway: Arc<RpcGateway>,
    interval: Duration,
    cancel: CancelSignal,
) -> (JoinHandle<()>, watch::Receiver<Option<HealthReport>>) {
    let (tx, rx) = watch::channel(None);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_status = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("health check stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let report = gateway.get_health().await;
                    if last_status != Some(report.status) {
                        info!(endpoint = %report.endpoint, status = ?report.status, latency_ms = report.latency_ms, "rpc health changed");
                        last_status = Some(report.status);
                    }
                    if tx.send(Some(report)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::gateway::tests::{method, rpc_result, test_gateway};
    use mockito::Server;

    #[tokio::test]
    async fn test_health_ok() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_body(method("getLatestBlockhash"))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!({
                "context": {"slot": 1},
                "value": {"blockhash": solana_sdk::hash::Hash::new_unique().to_string(), "lastValidBlockHeight": 10}
            })))
            .create_async()
            .await;

        let report = test_gateway(server.url()).get_health().await;
        assert!(report.is_ok());
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_health_unhealthy_without_retry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let report = test_gateway(server.url()).get_health().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.error, Some(RpcErrorKind::Network));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_task_publishes_and_stops() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .create_async()
            .await;

        let gateway = Arc::new(test_gateway(server.url()));
        let cancel = CancelSignal::new();
        let (handle, mut rx) = spawn_health_check(gateway, Duration::from_secs(30), cancel.clone());

        rx.changed().await.unwrap();
        let report = rx.borrow().clone().unwrap();
        assert_eq!(report.status, HealthStatus::Unhealthy);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
