use crate::AppState;
use crate::error::AppError;
use crate::helpers::hash_token;
use crate::validation;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::TypedHeader;
use axum_macros::debug_handler;
use headers::Authorization;
use headers::authorization::Bearer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wicgate_live::capacity::{self, CapacityStatus};
use wicgate_live::display;
use wicgate_live::{Id, OnlineResponse};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusResponse {
    loading: bool,
    error: Option<String>,
    is_online: bool,
    last_fetched_at: Option<i64>,
    is_initialized: bool,
    player_count: usize,
    players_online: bool,
}

#[derive(Deserialize)]
pub(crate) struct ServersQuery {
    capacity: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CapacityView {
    status: CapacityStatus,
    percentage: u32,
    has_space: bool,
    max: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerView {
    profile_id: Id,
    display_name: String,
    clan_tag: String,
    player_name: String,
    name_html: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerView {
    server_id: String,
    server_name: String,
    player_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    capacity: Option<CapacityView>,
    players: Vec<PlayerView>,
}

#[derive(Deserialize)]
pub(crate) struct VisibilityRequest {
    hidden: bool,
}

type AdminAuth = Option<TypedHeader<Authorization<Bearer>>>;

fn authorize(state: &AppState, auth: AdminAuth) -> Result<(), AppError> {
    let expected = state.admin_token_hash.as_deref().ok_or(AppError::Unauthorized)?;
    let TypedHeader(auth) = auth.ok_or(AppError::Unauthorized)?;

    if hash_token(auth.token()) != expected {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Latest snapshot, in the same shape the stats API serves it.
pub(crate) async fn online(State(state): State<Arc<AppState>>) -> Json<OnlineResponse> {
    let snapshot = state.live.state();
    Json(OnlineResponse {
        servers: snapshot.servers,
        profiles: snapshot.profiles,
    })
}

pub(crate) async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let snapshot = state.live.state();
    Json(StatusResponse {
        loading: snapshot.loading,
        player_count: snapshot.player_count(),
        players_online: snapshot.players_online(),
        error: snapshot.error,
        is_online: snapshot.is_online,
        last_fetched_at: snapshot.last_fetched_at,
        is_initialized: snapshot.is_initialized,
    })
}

/// Online players grouped per server, ready for display.
#[debug_handler]
pub(crate) async fn servers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ServersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let max = query.capacity.unwrap_or(capacity::SERVER_MAX_CAPACITY);
    validation::validate_capacity(max)?;

    let snapshot = state.live.state();
    let groups = display::group_players_by_server(&snapshot.profiles, &snapshot.servers);

    let mut views = Vec::with_capacity(groups.len());
    for group in groups {
        let count = group.players.len();
        let capacity = (!group.unassigned).then(|| CapacityView {
            status: capacity::status(count, max),
            percentage: capacity::percentage(count, max),
            has_space: capacity::has_space(count, max),
            max,
        });

        let mut players = Vec::with_capacity(count);
        for profile in &group.players {
            let parsed = display::parse_clan_tag(profile);
            players.push(PlayerView {
                profile_id: profile.profile_id.clone(),
                display_name: display::display_name(profile),
                clan_tag: parsed.clan_tag,
                player_name: parsed.player_name,
                name_html: state.names.colorize(&profile.profile_name).await,
            });
        }

        views.push(ServerView {
            server_id: group.server_id,
            server_name: group.server_name,
            player_count: count,
            capacity,
            players,
        });
    }

    Ok(Json(views))
}

#[debug_handler]
pub(crate) async fn refresh(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, auth)?;

    let live = state.live.clone();
    tokio::spawn(async move {
        let outcome = live.fetch_data().await;
        tracing::info!(?outcome, "Manual refresh finished");
    });

    Ok(StatusCode::ACCEPTED)
}

#[debug_handler]
pub(crate) async fn visibility(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(payload): Json<VisibilityRequest>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, auth)?;

    tracing::info!(hidden = payload.hidden, "Visibility changed by admin");
    state.live.environment().set_hidden(payload.hidden);

    Ok(StatusCode::ACCEPTED)
}

pub(crate) async fn connectivity(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, auth)?;

    tracing::info!("Connectivity restored by admin");
    state.live.environment().notify_online();

    Ok(StatusCode::ACCEPTED)
}
