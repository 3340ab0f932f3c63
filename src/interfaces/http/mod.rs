// ============================================================
// HTTP API
// ============================================================
// Upload, progress, cancel, and history endpoints

use std::sync::Arc;

use actix_cors::Cors;
use actix_multipart::form::tempfile::TempFile;
use actix_multipart::form::text::Text;
use actix_multipart::form::MultipartForm;
use actix_web::dev::Server;
use actix_web::{delete, get, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use validator::Validate;

use crate::application::use_cases::file_intake::UploadDescriptor;
use crate::application::use_cases::import_processor::{ImportReport, RunContext};
use crate::application::use_cases::materializer::ProcessingOptions;
use crate::application::{FileIntake, ImportProcessor};
use crate::domain::error::AppError;
use crate::domain::import_run::ImportStatus;
use crate::domain::payload::META_SOURCE_RUN;
use crate::domain::rules::ALLOWED_STATUSES;
use crate::domain::settings::ImporterSettings;
use crate::infrastructure::content::ContentStore;
use crate::infrastructure::db::import_runs::RunListQuery;
use crate::infrastructure::db::ImportRunRepository;
use crate::infrastructure::storage;

pub struct HttpState {
    pub processor: Arc<ImportProcessor>,
    pub intake: FileIntake,
    pub runs: Arc<ImportRunRepository>,
    pub store: Arc<dyn ContentStore>,
    pub settings: ImporterSettings,
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn ok_json<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        data: Some(data),
        message: None,
    })
}

fn fail_json(status: actix_web::http::StatusCode, message: String) -> HttpResponse {
    HttpResponse::build(status).json(Envelope::<()> {
        success: false,
        data: None,
        message: Some(message),
    })
}

fn error_response(err: &AppError) -> HttpResponse {
    use actix_web::http::StatusCode;

    let status = match err {
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::UploadError(_) | AppError::ValidationError(_) | AppError::ParseError(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail_json(status, err.to_string())
}

/// Token check standing in for the host's nonce plumbing. The token comes
/// from the `X-Api-Token` header or a `token` query parameter.
fn token_valid(settings: &ImporterSettings, request: &HttpRequest) -> bool {
    let provided = request
        .headers()
        .get("X-Api-Token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            web::Query::<TokenQuery>::from_query(request.query_string())
                .ok()
                .and_then(|q| q.token.clone())
        });

    provided.as_deref() == Some(settings.api_token.as_str())
}

fn forbidden() -> HttpResponse {
    fail_json(
        actix_web::http::StatusCode::FORBIDDEN,
        "Security verification failed".to_string(),
    )
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[derive(Debug, MultipartForm)]
struct UploadForm {
    #[multipart(rename = "csv_file", limit = "50MB")]
    csv_file: TempFile,
    token: Text<String>,
    post_status: Option<Text<String>>,
    post_author: Option<Text<i64>>,
}

#[derive(Serialize)]
struct UploadResponse {
    import_id: i64,
    results: ImportReport,
    upload_checks: crate::application::use_cases::file_intake::IntakeReport,
}

#[post("/imports")]
async fn upload(
    state: web::Data<HttpState>,
    MultipartForm(form): MultipartForm<UploadForm>,
) -> impl Responder {
    if form.token.as_str() != state.settings.api_token {
        return forbidden();
    }

    let post_status = match form.post_status.as_ref().map(|s| s.as_str()) {
        Some(status) if ALLOWED_STATUSES.contains(&status) => status.to_string(),
        _ => state.settings.default_status.clone(),
    };
    let post_author = form
        .post_author
        .map(|author| author.0)
        .filter(|author| *author > 0)
        .unwrap_or(state.settings.default_author);

    let descriptor = UploadDescriptor {
        original_name: form.csv_file.file_name.clone().unwrap_or_default(),
        temp_path: form.csv_file.file.path().to_path_buf(),
        reported_size: form.csv_file.size as u64,
        transfer_error: None,
    };

    info!(
        filename = %descriptor.original_name,
        size = descriptor.reported_size,
        "Upload received"
    );

    let (staged, report) = match state.intake.accept(&descriptor, post_author) {
        Ok(accepted) => accepted,
        Err(e) => {
            error!(error = %e, "Upload rejected");
            return error_response(&e);
        }
    };

    let context = RunContext {
        user_id: post_author,
        original_filename: descriptor.original_name.clone(),
        stored_filename: staged
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        file_size: descriptor.reported_size as i64,
    };
    let options = ProcessingOptions {
        batch_size: state.settings.batch_size,
        default_status: post_status,
        default_author: post_author,
        skip_errors: state.settings.skip_errors,
    };

    match state
        .processor
        .process_file(&staged, &context, &options)
        .await
    {
        Ok(results) => ok_json(UploadResponse {
            import_id: results.import_id,
            results,
            upload_checks: report,
        }),
        Err(e) => {
            storage::remove_staged(&staged);
            error_response(&e)
        }
    }
}

#[get("/imports/{id}")]
async fn progress(
    state: web::Data<HttpState>,
    request: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    if !token_valid(&state.settings, &request) {
        return forbidden();
    }

    match state.processor.progress(path.into_inner()).await {
        Ok(run) => ok_json(run),
        Err(e) => error_response(&e),
    }
}

#[post("/imports/{id}/cancel")]
async fn cancel(
    state: web::Data<HttpState>,
    request: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    if !token_valid(&state.settings, &request) {
        return forbidden();
    }

    match state.processor.cancel(path.into_inner()).await {
        Ok(()) => ok_json("Import cancelled successfully"),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize, Validate)]
struct HistoryQuery {
    user_id: Option<i64>,
    status: Option<String>,
    #[validate(range(min = 1, max = 100))]
    limit: Option<i64>,
    #[validate(range(min = 0))]
    offset: Option<i64>,
    token: Option<String>,
}

#[get("/imports")]
async fn history(
    state: web::Data<HttpState>,
    request: HttpRequest,
    query: web::Query<HistoryQuery>,
) -> impl Responder {
    if !token_valid(&state.settings, &request) {
        return forbidden();
    }

    if let Err(e) = query.validate() {
        return fail_json(actix_web::http::StatusCode::BAD_REQUEST, e.to_string());
    }

    let status = match query.status.as_deref() {
        Some(raw) => match ImportStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return fail_json(
                    actix_web::http::StatusCode::BAD_REQUEST,
                    format!("Unknown status filter: {}", raw),
                )
            }
        },
        None => None,
    };

    let list_query = RunListQuery {
        user_id: query.user_id,
        status,
        limit: query.limit.unwrap_or(20),
        offset: query.offset.unwrap_or(0),
    };

    match state.runs.list(&list_query).await {
        Ok(page) => ok_json(page),
        Err(e) => error_response(&e),
    }
}

#[get("/imports/stats")]
async fn statistics(state: web::Data<HttpState>, request: HttpRequest) -> impl Responder {
    if !token_valid(&state.settings, &request) {
        return forbidden();
    }

    match state.runs.statistics().await {
        Ok(stats) => ok_json(stats),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<i64>,
}

#[get("/imports/recent")]
async fn recent_activity(
    state: web::Data<HttpState>,
    request: HttpRequest,
    query: web::Query<RecentQuery>,
) -> impl Responder {
    if !token_valid(&state.settings, &request) {
        return forbidden();
    }

    match state.runs.recent(query.limit.unwrap_or(10).clamp(1, 50)).await {
        Ok(runs) => ok_json(runs),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    delete_pages: bool,
}

#[delete("/imports/{id}")]
async fn delete_run(
    state: web::Data<HttpState>,
    request: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<DeleteQuery>,
) -> impl Responder {
    if !token_valid(&state.settings, &request) {
        return forbidden();
    }

    let run_id = path.into_inner();

    if query.delete_pages {
        match state
            .store
            .delete_pages_by_meta(META_SOURCE_RUN, &run_id.to_string())
            .await
        {
            Ok(deleted) => info!(run_id, deleted, "Import pages deleted"),
            Err(e) => return error_response(&e),
        }
    }

    match state.runs.delete(run_id).await {
        Ok(()) => ok_json("Import record deleted"),
        Err(e) => error_response(&e),
    }
}

#[derive(Serialize)]
struct UploadInfo {
    max_file_size: u64,
    allowed_extensions: Vec<&'static str>,
    upload_dir_writable: bool,
}

#[get("/upload-info")]
async fn upload_info(state: web::Data<HttpState>) -> impl Responder {
    let writable = storage::ensure_upload_root(&state.settings.upload_dir).is_ok();

    ok_json(UploadInfo {
        max_file_size: state.settings.max_file_size,
        allowed_extensions: vec!["csv"],
        upload_dir_writable: writable,
    })
}

/// Build and start the API server.
pub fn start_server(state: HttpState) -> std::io::Result<Server> {
    let bind_addr = state.settings.bind_addr.clone();
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new().wrap(cors).app_data(state.clone()).service(
            web::scope("/api")
                .service(upload)
                .service(statistics)
                .service(recent_activity)
                .service(history)
                .service(progress)
                .service(cancel)
                .service(delete_run)
                .service(upload_info),
        )
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}
