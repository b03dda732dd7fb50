use arena_execution::{Backend, Engine};
use arena_types::{Error, Points, TournamentId, UserId};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State as AxumState,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::{Arena, Operation};

/// Simple health response for basic liveness checks
#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

/// Wire shape of every failure.
#[derive(Debug, Serialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    code: u16,
    message: String,
}

pub(super) struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            body: ErrorBody {
                kind: err.code().to_string(),
                code: status.as_u16(),
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Deserialize)]
pub(super) struct RegisterRequest {
    name: String,
    balance: Points,
}

#[derive(Deserialize)]
pub(super) struct PointsRequest {
    points: Points,
}

#[derive(Deserialize)]
pub(super) struct CreateTournamentRequest {
    name: String,
    deposit: Points,
}

#[derive(Deserialize)]
pub(super) struct JoinRequest {
    #[serde(rename = "userId")]
    user_id: UserId,
}

fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| Error::InvalidInput(rejection.body_text()).into())
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => Err(ApiError {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            body: ErrorBody {
                kind: "payload_too_large".to_string(),
                code: StatusCode::PAYLOAD_TOO_LARGE.as_u16(),
                message: rejection.body_text(),
            },
        }),
        Err(rejection) => Err(Error::InvalidInput(rejection.body_text()).into()),
    }
}

/// Run `op` on the blocking pool and time it.
async fn run<T, F>(arena: &Arc<Arena>, operation: Operation, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Engine<Backend>) -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    let start = Instant::now();
    let worker = arena.clone();
    let result = tokio::task::spawn_blocking(move || op(worker.engine()))
        .await
        .unwrap_or_else(|err| Err(Error::Storage(format!("engine task failed: {err}"))));
    arena.record(operation, start.elapsed());
    result.map_err(|err| {
        arena.http_metrics().inc_rejected();
        warn!(?operation, code = err.code(), error = %err, "operation rejected");
        err.into()
    })
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, ApiError>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn config(AxumState(arena): AxumState<Arc<Arena>>) -> Response {
    Json(arena.config().clone()).into_response()
}

pub(super) async fn http_metrics(AxumState(arena): AxumState<Arc<Arena>>) -> Response {
    Json(arena.http_metrics_snapshot()).into_response()
}

pub(super) async fn not_found() -> Response {
    ApiError {
        status: StatusCode::NOT_FOUND,
        body: ErrorBody {
            kind: "route_not_found".to_string(),
            code: StatusCode::NOT_FOUND.as_u16(),
            message: "no such route".to_string(),
        },
    }
    .into_response()
}

pub(super) async fn register_user(
    AxumState(arena): AxumState<Arc<Arena>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let result = match json_body(body) {
        Ok(request) => {
            run(&arena, Operation::RegisterUser, move |engine| {
                engine.register_user(&request.name, request.balance)
            })
            .await
        }
        Err(err) => Err(err),
    };
    respond(StatusCode::CREATED, result)
}

pub(super) async fn get_user(
    AxumState(arena): AxumState<Arc<Arena>>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let result = match path_id(id) {
        Ok(id) => run(&arena, Operation::GetUser, move |engine| engine.user(id)).await,
        Err(err) => Err(err),
    };
    respond(StatusCode::OK, result)
}

pub(super) async fn delete_user(
    AxumState(arena): AxumState<Arc<Arena>>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let result = match path_id(id) {
        Ok(id) => run(&arena, Operation::DeleteUser, move |engine| engine.delete_user(id)).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(super) async fn take(
    AxumState(arena): AxumState<Arc<Arena>>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<PointsRequest>, JsonRejection>,
) -> Response {
    let result = match (path_id(id), json_body(body)) {
        (Ok(id), Ok(request)) => {
            run(&arena, Operation::Take, move |engine| {
                engine.take(id, request.points)
            })
            .await
        }
        (Err(err), _) | (_, Err(err)) => Err(err),
    };
    respond(StatusCode::OK, result)
}

pub(super) async fn fund(
    AxumState(arena): AxumState<Arc<Arena>>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<PointsRequest>, JsonRejection>,
) -> Response {
    let result = match (path_id(id), json_body(body)) {
        (Ok(id), Ok(request)) => {
            run(&arena, Operation::Fund, move |engine| {
                engine.fund(id, request.points)
            })
            .await
        }
        (Err(err), _) | (_, Err(err)) => Err(err),
    };
    respond(StatusCode::OK, result)
}

pub(super) async fn create_tournament(
    AxumState(arena): AxumState<Arc<Arena>>,
    body: Result<Json<CreateTournamentRequest>, JsonRejection>,
) -> Response {
    let result = match json_body(body) {
        Ok(request) => {
            run(&arena, Operation::CreateTournament, move |engine| {
                engine
                    .create_tournament(&request.name, request.deposit)
                    .map(|t| t.view())
            })
            .await
        }
        Err(err) => Err(err),
    };
    respond(StatusCode::CREATED, result)
}

pub(super) async fn get_tournament(
    AxumState(arena): AxumState<Arc<Arena>>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let result = match path_id(id) {
        Ok(id) => {
            run(&arena, Operation::GetTournament, move |engine| {
                engine.tournament(id).map(|t| t.view())
            })
            .await
        }
        Err(err) => Err(err),
    };
    respond(StatusCode::OK, result)
}

pub(super) async fn join(
    AxumState(arena): AxumState<Arc<Arena>>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> Response {
    let result = match (path_id(id), json_body(body)) {
        (Ok(id), Ok(request)) => {
            let tournament: TournamentId = id;
            run(&arena, Operation::Join, move |engine| {
                engine.join(tournament, request.user_id).map(|t| t.view())
            })
            .await
        }
        (Err(err), _) | (_, Err(err)) => Err(err),
    };
    respond(StatusCode::OK, result)
}

pub(super) async fn finish(
    AxumState(arena): AxumState<Arc<Arena>>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let result = match path_id(id) {
        Ok(id) => {
            run(&arena, Operation::Finish, move |engine| {
                engine.finish(id).map(|t| t.view())
            })
            .await
        }
        Err(err) => Err(err),
    };
    respond(StatusCode::OK, result)
}

pub(super) async fn delete_tournament(
    AxumState(arena): AxumState<Arc<Arena>>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let result = match path_id(id) {
        Ok(id) => {
            run(&arena, Operation::DeleteTournament, move |engine| {
                engine.delete_tournament(id).map(|t| t.view())
            })
            .await
        }
        Err(err) => Err(err),
    };
    respond(StatusCode::OK, result)
}
