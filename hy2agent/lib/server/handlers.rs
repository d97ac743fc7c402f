//! HTTP request handlers for the REST API.
//!
//! Handlers are thin: they translate between JSON and the management, runtime and policy layers
//! and map [`AgentError`]s onto status codes.

use std::{future::Future, net::IpAddr, time::Duration};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::sync::CancellationToken;

use crate::{
    runtime::{check_health, HealthReport, LogQuery},
    stats::{DiskInfo, MemoryInfo, NetworkInfo, SystemInfo, SystemStatus},
    AgentError, AgentResult,
};

use super::{
    types::{
        BackupsResponse, BlacklistResponse, CommandResponse, ConfigBody, DomainListRequest,
        DomainsResponse, ErrorResponse, HysteriaStatusResponse, InstallVersionRequest,
        IpListRequest, LogsParams, LogsResponse, MessageResponse, RestoreRequest,
        VersionsResponse, WhitelistResponse,
    },
    AgentState,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long a timed-out operation may take to wind down after its token is cancelled.
const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(5);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An [`AgentError`] on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError(AgentError);

type ApiResponse<T> = Result<Json<T>, ApiError>;

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

/// `GET /api/v1/status`
pub async fn system_status(State(state): State<AgentState>) -> ApiResponse<SystemStatus> {
    Ok(Json(state.get_stats().status().await?))
}

/// `GET /api/v1/system/memory`
pub async fn system_memory(State(state): State<AgentState>) -> ApiResponse<MemoryInfo> {
    Ok(Json(state.get_stats().memory().await?))
}

/// `GET /api/v1/system/disk`
pub async fn system_disk(State(state): State<AgentState>) -> ApiResponse<Vec<DiskInfo>> {
    Ok(Json(state.get_stats().disks().await?))
}

/// `GET /api/v1/system/network`
pub async fn system_network(State(state): State<AgentState>) -> ApiResponse<NetworkInfo> {
    Ok(Json(state.get_stats().network().await?))
}

/// `GET /api/v1/system/info`
pub async fn system_info(State(state): State<AgentState>) -> ApiResponse<SystemInfo> {
    Ok(Json(state.get_stats().system_info().await?))
}

/// `GET /api/v1/hysteria/status`
///
/// A missing daemon is not an HTTP error: the status is returned with `is_installed: false`
/// and an `error` field.
pub async fn hysteria_status(State(state): State<AgentState>) -> Json<HysteriaStatusResponse> {
    let response = match state.get_probe().status().await {
        Ok(status) => HysteriaStatusResponse {
            status,
            error: None,
        },
        Err(e) => HysteriaStatusResponse {
            status: Default::default(),
            error: Some(e.to_string()),
        },
    };

    Json(response)
}

/// `GET /api/v1/hysteria/config`
pub async fn get_config(State(state): State<AgentState>) -> ApiResponse<ConfigBody> {
    let config = state.get_config().get().await?;
    Ok(Json(ConfigBody { config }))
}

/// `PUT /api/v1/hysteria/config`
pub async fn update_config(
    State(state): State<AgentState>,
    Json(body): Json<ConfigBody>,
) -> ApiResponse<MessageResponse> {
    tracing::info!("received config update ({} bytes)", body.config.len());

    let manager = state.get_config();
    with_deadline(*state.get_request_timeout(), |cancel| async move {
        manager.update(&body.config, &cancel).await
    })
    .await?;

    Ok(Json(MessageResponse::new("config updated successfully")))
}

/// `GET /api/v1/hysteria/config/backups`
pub async fn list_backups(State(state): State<AgentState>) -> ApiResponse<BackupsResponse> {
    let backups = state.get_config().list_backups().await?;
    Ok(Json(BackupsResponse { backups }))
}

/// `POST /api/v1/hysteria/config/restore`
pub async fn restore_config(
    State(state): State<AgentState>,
    Json(body): Json<RestoreRequest>,
) -> ApiResponse<MessageResponse> {
    tracing::info!("received restore request for {}", body.backup);

    let manager = state.get_config();
    with_deadline(*state.get_request_timeout(), |cancel| async move {
        manager.restore(&body.backup, &cancel).await
    })
    .await?;

    Ok(Json(MessageResponse::new("config restored successfully")))
}

/// `GET /api/v1/hysteria/logs`
pub async fn logs(
    State(state): State<AgentState>,
    Query(params): Query<LogsParams>,
) -> ApiResponse<LogsResponse> {
    let query = LogQuery::from_raw(
        params.lines.as_deref(),
        params.since.as_deref(),
        params.level.as_deref(),
    );
    tracing::debug!("{}", query.render(state.get_service_unit()));

    let logs = query.fetch(state.get_supervisor().as_ref()).await?;
    Ok(Json(LogsResponse { logs }))
}

/// `POST /api/v1/hysteria/install`
pub async fn install(State(state): State<AgentState>) -> ApiResponse<CommandResponse> {
    tracing::info!("received install request");
    let output = state.get_lifecycle().install().await?;
    Ok(Json(CommandResponse::new("hysteria2 installed successfully", output)))
}

/// `POST /api/v1/hysteria/uninstall`
pub async fn uninstall(State(state): State<AgentState>) -> ApiResponse<CommandResponse> {
    tracing::info!("received uninstall request");
    let output = state.get_lifecycle().uninstall().await?;
    Ok(Json(CommandResponse::new("hysteria2 uninstalled successfully", output)))
}

/// `POST /api/v1/hysteria/update`
pub async fn upgrade(State(state): State<AgentState>) -> ApiResponse<CommandResponse> {
    tracing::info!("received update request");
    let output = state.get_lifecycle().upgrade().await?;
    Ok(Json(CommandResponse::new("hysteria2 updated successfully", output)))
}

/// `POST /api/v1/hysteria/start`
pub async fn start(State(state): State<AgentState>) -> ApiResponse<MessageResponse> {
    let lifecycle = state.get_lifecycle();
    with_deadline(*state.get_request_timeout(), |cancel| async move {
        lifecycle.start(&cancel).await
    })
    .await?;

    Ok(Json(MessageResponse::new("hysteria2 service started")))
}

/// `POST /api/v1/hysteria/stop`
pub async fn stop(State(state): State<AgentState>) -> ApiResponse<MessageResponse> {
    let lifecycle = state.get_lifecycle();
    with_deadline(*state.get_request_timeout(), |cancel| async move {
        lifecycle.stop(&cancel).await
    })
    .await?;

    Ok(Json(MessageResponse::new("hysteria2 service stopped")))
}

/// `POST /api/v1/hysteria/restart`
pub async fn restart(State(state): State<AgentState>) -> ApiResponse<MessageResponse> {
    let lifecycle = state.get_lifecycle();
    with_deadline(*state.get_request_timeout(), |cancel| async move {
        lifecycle.restart(&cancel).await
    })
    .await?;

    Ok(Json(MessageResponse::new("hysteria2 service restarted")))
}

/// `GET /api/v1/hysteria/health`
pub async fn health(State(state): State<AgentState>) -> Json<HealthReport> {
    Json(check_health(state.get_probe(), state.get_config().path()).await)
}

/// `GET /api/v1/hysteria/versions`
pub async fn versions(State(state): State<AgentState>) -> ApiResponse<VersionsResponse> {
    let versions = state.get_releases().available_versions().await?;
    Ok(Json(VersionsResponse { versions }))
}

/// `POST /api/v1/hysteria/versions/install`
pub async fn install_version(
    State(state): State<AgentState>,
    Json(body): Json<InstallVersionRequest>,
) -> ApiResponse<CommandResponse> {
    tracing::info!("received install request for version {}", body.version);
    let output = state.get_lifecycle().install_version(&body.version).await?;
    Ok(Json(CommandResponse::new("version installed successfully", output)))
}

/// `GET /api/v1/config/whitelist`
pub async fn get_whitelist(State(state): State<AgentState>) -> Json<WhitelistResponse> {
    let policy = state.get_policy().read().await;
    Json(WhitelistResponse {
        whitelist: policy.get_ip_whitelist().clone(),
    })
}

/// `PUT /api/v1/config/whitelist`
pub async fn update_whitelist(
    State(state): State<AgentState>,
    Json(body): Json<IpListRequest>,
) -> ApiResponse<WhitelistResponse> {
    let ips = parse_ips(body.ips)?;
    let policy = state
        .get_policy()
        .replace_with(|current| current.clone().with_ip_whitelist(ips))
        .await?;

    tracing::info!("ip whitelist replaced ({} entries)", policy.get_ip_whitelist().len());
    Ok(Json(WhitelistResponse {
        whitelist: policy.get_ip_whitelist().clone(),
    }))
}

/// `GET /api/v1/config/blacklist`
pub async fn get_blacklist(State(state): State<AgentState>) -> Json<BlacklistResponse> {
    let policy = state.get_policy().read().await;
    Json(BlacklistResponse {
        blacklist: policy.get_ip_blacklist().clone(),
    })
}

/// `PUT /api/v1/config/blacklist`
pub async fn update_blacklist(
    State(state): State<AgentState>,
    Json(body): Json<IpListRequest>,
) -> ApiResponse<BlacklistResponse> {
    let ips = parse_ips(body.ips)?;
    let policy = state
        .get_policy()
        .replace_with(|current| current.clone().with_ip_blacklist(ips))
        .await?;

    tracing::info!("ip blacklist replaced ({} entries)", policy.get_ip_blacklist().len());
    Ok(Json(BlacklistResponse {
        blacklist: policy.get_ip_blacklist().clone(),
    }))
}

/// `GET /api/v1/config/domains`
pub async fn get_domains(State(state): State<AgentState>) -> Json<DomainsResponse> {
    let policy = state.get_policy().read().await;
    Json(DomainsResponse {
        domains: policy.get_domain_whitelist().clone(),
    })
}

/// `PUT /api/v1/config/domains`
pub async fn update_domains(
    State(state): State<AgentState>,
    Json(body): Json<DomainListRequest>,
) -> ApiResponse<DomainsResponse> {
    let domains = validate_domains(body.domains)?;
    let policy = state
        .get_policy()
        .replace_with(|current| current.clone().with_domain_whitelist(domains))
        .await?;

    tracing::info!(
        "domain whitelist replaced ({} entries)",
        policy.get_domain_whitelist().len()
    );
    Ok(Json(DomainsResponse {
        domains: policy.get_domain_whitelist().clone(),
    }))
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Runs `op` with a deadline and a cancellation token.
///
/// When the deadline passes the token is cancelled and `op` gets a grace period to stop at its
/// next cancellation point, so it can still report how far it got. A config that was written
/// but not verified comes back as [`AgentError::ConfigNotApplied`]. The token is also cancelled
/// when the request future is dropped, for example because the client went away.
async fn with_deadline<F, Fut, T>(timeout: Duration, op: F) -> AgentResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = AgentResult<T>>,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let op = op(cancel.clone());
    tokio::pin!(op);

    if let Ok(result) = tokio::time::timeout(timeout, &mut op).await {
        return result;
    }

    cancel.cancel();
    match tokio::time::timeout(CANCEL_GRACE_PERIOD, op).await {
        Ok(result) => result.map_err(|e| deadline_error(e, timeout)),
        Err(_) => {
            tracing::warn!("operation ignored cancellation for {:?}", CANCEL_GRACE_PERIOD);
            Err(AgentError::Timeout(timeout))
        }
    }
}

/// Reports a cancellation caused by the deadline as a timeout, keeping any wrapping context.
fn deadline_error(error: AgentError, timeout: Duration) -> AgentError {
    match error {
        AgentError::Cancelled => AgentError::Timeout(timeout),
        AgentError::ConfigNotApplied(source) => {
            AgentError::ConfigNotApplied(Box::new(deadline_error(*source, timeout)))
        }
        other => other,
    }
}

/// Parses IP entries into their canonical text form.
fn parse_ips(entries: Vec<String>) -> AgentResult<Vec<String>> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpAddr>()
                .map(|ip| ip.to_canonical().to_string())
                .map_err(|_| AgentError::InvalidArgument(format!("invalid ip address: {}", entry)))
        })
        .collect()
}

/// Accepts hostnames and `*.suffix` wildcards.
fn validate_domains(entries: Vec<String>) -> AgentResult<Vec<String>> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let name = entry.strip_prefix("*.").unwrap_or(&entry);
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
                && !name.starts_with('.')
                && !name.ends_with('.');

            if valid {
                Ok(entry)
            } else {
                Err(AgentError::InvalidArgument(format!(
                    "invalid domain entry: {}",
                    entry
                )))
            }
        })
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<E> From<E> for ApiError
where
    E: Into<AgentError>,
{
    fn from(error: E) -> Self {
        ApiError(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AgentError::InvalidArgument(_) | AgentError::InvalidBackupName(_) => {
                StatusCode::BAD_REQUEST
            }
            AgentError::BackupNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                output: self.0.output().map(str::to_string),
            }),
        )
            .into_response()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: AgentError) -> StatusCode {
        ApiError(error).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(AgentError::InvalidBackupName("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AgentError::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AgentError::BackupNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(AgentError::NotInstalled),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_parse_ips() {
        assert_eq!(
            parse_ips(vec![" 10.0.0.1 ".into(), "".into(), "::ffff:10.0.0.2".into()]).unwrap(),
            vec!["10.0.0.1", "10.0.0.2"]
        );
        assert!(matches!(
            parse_ips(vec!["10.0.0.256".into()]),
            Err(AgentError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validate_domains() {
        assert_eq!(
            validate_domains(vec!["example.com".into(), "*.corp.example".into()]).unwrap(),
            vec!["example.com", "*.corp.example"]
        );

        for bad in ["*.", "exa mple.com", "foo.*.com", ".example.com"] {
            assert!(
                validate_domains(vec![bad.to_string()]).is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_with_deadline_cancels_and_reports_timeout() -> anyhow::Result<()> {
        let result: AgentResult<()> = with_deadline(Duration::from_millis(10), |cancel| async move {
            cancel.cancelled().await;
            Err(AgentError::Cancelled)
        })
        .await;

        assert!(matches!(
            result,
            Err(AgentError::Timeout(timeout)) if timeout == Duration::from_millis(10)
        ));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_with_deadline_keeps_not_applied_context() -> anyhow::Result<()> {
        let result: AgentResult<()> = with_deadline(Duration::from_millis(10), |cancel| async move {
            cancel.cancelled().await;
            Err(AgentError::ConfigNotApplied(Box::new(AgentError::Cancelled)))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "config written but not applied: operation timed out after 10ms"
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_with_deadline_passes_fast_results_through() -> anyhow::Result<()> {
        let result = with_deadline(Duration::from_secs(5), |_| async { AgentResult::Ok(7) }).await?;
        assert_eq!(result, 7);

        Ok(())
    }
}
