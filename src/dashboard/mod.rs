use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::TaskmasterError;
use crate::scheduler::{GroupRouter, GroupStatus};

#[derive(Clone)]
pub struct DashboardState {
    pub router: Arc<GroupRouter>,
}

#[derive(Serialize)]
struct GroupsResponse {
    group_count: usize,
    groups: Vec<GroupStatus>,
}

#[derive(Deserialize)]
struct InsertTaskRequest {
    group: String,
    payload: String,
}

#[derive(Serialize)]
struct InsertTaskResponse {
    success: bool,
    id: Option<String>,
    error: Option<String>,
}

/// Routes served by the status dashboard.
pub fn app(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(status_page_handler))
        .route("/tasks", get(status_page_handler))
        .route("/api/groups", get(list_groups_handler))
        .route("/api/tasks", post(insert_task_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    let served = axum::serve(listener, app(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(e) = served {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn status_page_handler(State(state): State<DashboardState>) -> Html<String> {
    Html(render_status_page(&state.router.status().await))
}

async fn list_groups_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let groups = state.router.status().await;
    Json(GroupsResponse {
        group_count: groups.len(),
        groups,
    })
}

async fn insert_task_handler(
    State(state): State<DashboardState>,
    Json(req): Json<InsertTaskRequest>,
) -> impl IntoResponse {
    match state.router.insert(&req.group, req.payload).await {
        Ok(id) => {
            tracing::info!(group = %req.group, task_id = %id, "Task inserted via dashboard");
            (
                StatusCode::OK,
                Json(InsertTaskResponse {
                    success: true,
                    id: Some(id),
                    error: None,
                }),
            )
        }
        Err(e) => {
            let code = match e {
                TaskmasterError::InvalidGroup(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                code,
                Json(InsertTaskResponse {
                    success: false,
                    id: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Plain HTML listing of every group and the lease state of each task.
pub fn render_status_page(groups: &[GroupStatus]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<h2> Total group count: {} </h2>", groups.len());
    for group in groups {
        let _ = writeln!(out, "<div>");
        let _ = writeln!(out, "<h3> Group `{}` </h3>", escape_html(&group.name));
        let _ = writeln!(out, "<h4> Task Number: {} </h4>", group.task_count);
        for task in &group.tasks {
            let _ = writeln!(
                out,
                "<div><b>[{}]</b> {}</div>",
                task.state,
                escape_html(&task.id)
            );
        }
        let _ = writeln!(out, "</div>");
    }
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{TaskState, TaskStatus};
    use chrono::Utc;

    #[test]
    fn renders_empty_report() {
        let html = render_status_page(&[]);
        assert_eq!(html, "<h2> Total group count: 0 </h2>\n");
    }

    #[test]
    fn renders_groups_and_labels() {
        let now = Utc::now();
        let groups = vec![GroupStatus {
            name: "render".to_string(),
            task_count: 2,
            tasks: vec![
                TaskStatus {
                    id: "a".to_string(),
                    state: TaskState::Pending,
                    lease_expiry: now,
                },
                TaskStatus {
                    id: "b".to_string(),
                    state: TaskState::Leased,
                    lease_expiry: now,
                },
            ],
        }];

        let html = render_status_page(&groups);
        assert!(html.contains("Total group count: 1"));
        assert!(html.contains("Group `render`"));
        assert!(html.contains("Task Number: 2"));
        assert!(html.contains("<b>[Pending]</b> a"));
        assert!(html.contains("<b>[Leased]</b> b"));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<a&b>"), "&lt;a&amp;b&gt;");
    }
}
