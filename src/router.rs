use crate::{
    auth::{authenticate, require_developer},
    handlers::{auth as auth_handlers, reports},
    middleware::{
        cors_layer, health_check, propagate_request_id_layer, request_id_layer, trace_layer,
        validate_request_size,
    },
    AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;

/// Build the application router.
///
/// `/health` and `/token` are public. Every other route needs a valid token;
/// everything except report submission additionally needs a developer token.
pub fn create_app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route(
            "/token",
            post(auth_handlers::exchange_token).put(auth_handlers::exchange_token),
        );

    let developer_routes = Router::new()
        .route(
            "/certificate/:cert",
            post(auth_handlers::add_certificate).delete(auth_handlers::remove_certificate),
        )
        .route(
            "/report/group/:gid",
            get(reports::get_group_reports).delete(reports::delete_group),
        )
        .route("/report/severity/:slvl", get(reports::get_severity_reports))
        .route(
            "/report/key/*key",
            get(reports::get_report).delete(reports::delete_report),
        )
        .route_layer(from_fn(require_developer));

    // submitting is open to application tokens, listing is not
    let report_root = post(reports::post_report)
        .merge(get(reports::get_all_reports).route_layer(from_fn(require_developer)));

    let protected_routes = Router::new()
        .route("/report", report_root)
        .merge(developer_routes)
        .route_layer(from_fn_with_state(state.tokens.clone(), authenticate));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(request_id_layer())
                .layer(trace_layer())
                .layer(propagate_request_id_layer())
                .layer(cors_layer(&state.config))
                .layer(from_fn_with_state(
                    state.config.clone(),
                    validate_request_size,
                ))
                .layer(DefaultBodyLimit::max(state.config.server.max_body_size)),
        )
        .with_state(state)
}
