use crate::models::db_operations::users_db_operations;
use crate::DbPool;
use actix_web::{
    body::EitherBody,
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, FromRequest, HttpRequest, HttpResponse,
};
use actix_session::{Session, SessionExt};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use serde::Serialize;
use serde_json::json;
use std::future::{ready, Ready as StdReady};

#[derive(Serialize, Debug)]
pub struct AuthenticatedAdmin {
    pub email: String,
    pub role: String,
}

impl FromRequest for AuthenticatedAdmin {
    type Error = actix_web::Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let session = req.get_session();
        match (session.get::<String>("email"), session.get::<String>("role")) {
            (Ok(Some(email)), Ok(Some(role))) if role == "admin" => ready(Ok(AuthenticatedAdmin { email, role })),
            _ => ready(Err(actix_web::error::ErrorUnauthorized("Not logged in."))),
        }
    }
}

pub fn admin_guard(session: &Session) -> bool {
    session.get::<String>("role").unwrap_or(None) == Some("admin".to_string())
}

fn is_logged_in(session: &Session) -> bool {
    session.get::<String>("email").unwrap_or(None).is_some()
}

/// The session role is only a hint; the account must still be an active
/// admin in the user store.
fn account_is_admin(req: &ServiceRequest, session: &Session) -> bool {
    if !admin_guard(session) {
        return false;
    }
    let email = match session.get::<String>("email") {
        Ok(Some(email)) => email,
        _ => return false,
    };
    let pool = match req.app_data::<web::Data<DbPool>>() {
        Some(pool) => pool,
        None => {
            log::error!("User store is not registered; refusing admin session.");
            return false;
        }
    };
    match pool.get() {
        Ok(conn) => users_db_operations::is_admin(&conn, &email),
        Err(e) => {
            log::error!("Failed to get DB connection for admin check: {}", e);
            false
        }
    }
}

// --- Console gate ---

/// Lets sessions of active admin accounts through. Other requests get a JSON 401/403 on API
/// paths and a redirect to `login_path` everywhere else.
pub struct RequireAdmin {
    login_path: String,
}

impl RequireAdmin {
    pub fn new(login_path: impl Into<String>) -> Self {
        RequireAdmin { login_path: login_path.into() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireAdmin
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAdminMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequireAdminMiddleware { service, login_path: self.login_path.clone() })
    }
}

pub struct RequireAdminMiddleware<S> {
    service: S,
    login_path: String,
}

impl<S, B> Service<ServiceRequest> for RequireAdminMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let session = req.get_session();

        if account_is_admin(&req, &session) {
            let fut = self.service.call(req);
            return Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            });
        }

        let is_api = req.path().contains("/api/");
        let logged_in = is_logged_in(&session);
        let login_path = self.login_path.clone();

        Box::pin(async move {
            let (http_req, _payload) = req.into_parts();
            let res = if is_api && logged_in {
                log::warn!("Non-admin session refused on {}", http_req.path());
                HttpResponse::Forbidden().json(json!({ "success": false, "error": "Administrator access required." }))
            } else if is_api {
                HttpResponse::Unauthorized().json(json!({ "success": false, "error": "Not logged in." }))
            } else {
                HttpResponse::Found().append_header(("location", login_path)).finish()
            };
            Ok(ServiceResponse::new(http_req, res.map_into_right_body()))
        })
    }
}
