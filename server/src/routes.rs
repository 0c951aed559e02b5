use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::post, Router};

use crate::auth;
use crate::deliveries;
use crate::readings;
use crate::resources::{employees, fuels, positions, roles, tanks, users};
use crate::state::AppState;

/// Everything under `/api`. Login is the only route reachable without a
/// session; the rest sits behind [`auth::require_auth`], with the admin-only
/// operations gated per handler.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .nest("/roles", roles::router())
        .nest("/users", users::router())
        .nest("/positions", positions::router())
        .nest("/employees", employees::router())
        .nest("/fuels", fuels::router())
        .nest("/fueltanks", tanks::router())
        .nest("/fuelreadings", readings::router())
        .nest("/fueldeliveries", deliveries::router())
        .route("/auth/logout", post(auth::logout))
        .layer(from_fn_with_state(state, auth::require_auth));

    Router::new()
        .route("/auth/login", post(auth::login))
        .merge(protected)
}
