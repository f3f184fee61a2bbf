use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::dict::{MappingTable, Record, resolve};

/// Queries longer than this are rejected before resolving. The lookup
/// itself handles any length; this only bounds request size.
pub const MAX_QUERY_CHARS: usize = 512;

#[derive(Clone)]
pub struct AppState {
    pub table: Arc<MappingTable>,
    pub disable_cache: bool,
}

#[derive(Deserialize)]
pub struct LookupQuery {
    pub text: Option<String>,
}

#[derive(Serialize)]
pub struct LookupResponse {
    text: String,
    total: usize,
    rows: Vec<LookupRow>,
}

#[derive(Serialize)]
pub struct LookupRow {
    character: String,
    radical: String,
    key: String,
}

impl From<&Record> for LookupRow {
    fn from(record: &Record) -> Self {
        Self {
            character: record.character.clone(),
            radical: record.radical.clone(),
            key: record.key.clone(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(frontend))
        .route("/robots.txt", get(robots))
        .route("/healthz", get(healthz))
        .route("/v1/lookup", get(lookup))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn robots(State(state): State<AppState>) -> Response {
    let body = "User-agent: *\nDisallow: /";
    let content_type = (
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if state.disable_cache {
        return ([content_type], body).into_response();
    }
    (
        [
            content_type,
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=86400, immutable"),
            ),
        ],
        body,
    )
        .into_response()
}

async fn frontend(State(state): State<AppState>) -> Response {
    let html = Html(INDEX_HTML);
    if state.disable_cache {
        return html.into_response();
    }
    (
        [(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=3600, immutable"),
        )],
        html,
    )
        .into_response()
}

async fn lookup(
    State(state): State<AppState>,
    axum::extract::Query(params): axum::extract::Query<LookupQuery>,
) -> Result<Response, ApiError> {
    // Missing or empty text is the "nothing entered yet" state, not an
    // error: respond with zero rows.
    let text = params.text.unwrap_or_default();
    if text.chars().count() > MAX_QUERY_CHARS {
        return Err(ApiError::bad_request(format!(
            "text must be at most {MAX_QUERY_CHARS} characters"
        )));
    }

    let rows: Vec<LookupRow> = resolve(&text, &state.table)
        .into_iter()
        .map(LookupRow::from)
        .collect();
    let response = LookupResponse {
        total: rows.len(),
        text,
        rows,
    };

    if state.disable_cache {
        Ok(Json(response).into_response())
    } else {
        Ok((
            [(
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=300"),
            )],
            Json(response),
        )
            .into_response())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                let body = Json(ErrorResponse { error: msg });
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            ApiError::Internal => {
                let body = Json(json!({ "error": "internal server error" }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

const INDEX_HTML: &str = r#"
<!doctype html>
<html lang="zh-Hant">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>倉頡字典</title>
  <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css" rel="stylesheet">
  <style>
    body { background: #f8f9fa; }
    .result-table td, .result-table th { vertical-align: middle; }
    .char-cell { width: 4rem; font-size: 1.5rem; }
    .radical-cell { width: 9rem; font-size: 1.25rem; }
    .key-cell { width: 6rem; }
  </style>
</head>
<body class="py-4">
  <div class="container">
    <h1 class="h3">倉頡字典</h1>
    <hr>

    <div class="card shadow-sm">
      <div class="card-body">
        <label for="textInput" class="form-label fw-semibold">輸入文字：</label>
        <input id="textInput" type="text" class="form-control form-control-lg" placeholder="以文字查詢" autocomplete="off">
        <div class="d-grid mt-3">
          <button id="queryBtn" class="btn btn-secondary btn-lg">查詢</button>
        </div>
      </div>
    </div>

    <div class="mt-4">
      <h2 class="h5">查詢結果</h2>
      <div id="status" class="text-muted mb-2">尚未輸入文字。</div>
      <table class="table table-striped result-table">
        <thead>
          <tr><th class="char-cell">文字</th><th class="radical-cell">字根</th><th class="key-cell">倉頡碼</th></tr>
        </thead>
        <tbody id="resultRows"></tbody>
      </table>
    </div>
  </div>

  <script>
    const textInput = document.getElementById('textInput');
    const queryBtn = document.getElementById('queryBtn');
    const statusEl = document.getElementById('status');
    const resultRows = document.getElementById('resultRows');

    async function runLookup() {
      const text = textInput.value;
      if (!text) {
        resultRows.innerHTML = '';
        statusEl.textContent = '尚未輸入文字。';
        return;
      }
      try {
        const resp = await fetch(`/v1/lookup?text=${encodeURIComponent(text)}`);
        if (!resp.ok) throw new Error(`Request failed (${resp.status})`);
        const data = await resp.json();
        resultRows.innerHTML = '';
        if (data.rows.length === 0) {
          statusEl.textContent = '沒有符合的字。';
          return;
        }
        statusEl.textContent = `共 ${data.total} 筆`;
        data.rows.forEach(row => {
          const tr = document.createElement('tr');
          [['char-cell', row.character], ['radical-cell', row.radical], ['key-cell', row.key]].forEach(([cls, value]) => {
            const td = document.createElement('td');
            td.className = cls;
            td.textContent = value;
            tr.appendChild(td);
          });
          resultRows.appendChild(tr);
        });
      } catch (err) {
        statusEl.textContent = '查詢失敗。';
        resultRows.innerHTML = '';
      }
    }

    queryBtn.addEventListener('click', runLookup);
    textInput.addEventListener('input', runLookup);
    textInput.addEventListener('keydown', (e) => {
      if (e.key === 'Enter') {
        e.preventDefault();
        runLookup();
      }
    });
  </script>
</body>
</html>
"#;
