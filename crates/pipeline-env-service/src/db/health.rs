use crate::db::storage::Storage;
use crate::error::ServiceError;
use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Local};
use log::{error, trace};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;

/// Interval between two reachability checks of the pipeline environments
/// database.
const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of the most recent reachability check, served by `/healthz`.
#[derive(Debug)]
pub struct DbHealth {
    pub last_checked: DateTime<Local>,
    pub last_error: Option<ServiceError>,
}

async fn watch_reachability(health: Arc<Mutex<DbHealth>>, db: Arc<dyn Storage>) {
    loop {
        let checked_at = Local::now();
        let outcome = db.check_connection().await;
        let mut health = health.lock().await;
        health.last_checked = checked_at;
        health.last_error = outcome.err().map(ServiceError::from);
        if let Some(e) = &health.last_error {
            trace!("Pipeline environments database is unreachable: {e}");
        }
        drop(health);
        tokio::time::sleep(CHECK_INTERVAL).await;
    }
}

impl DbHealth {
    /// Starts checking `db` in the background. The returned state is healthy
    /// until the first check fails.
    pub fn watch(db: Arc<dyn Storage>) -> Arc<Mutex<DbHealth>> {
        let health = Arc::new(Mutex::new(DbHealth {
            last_checked: Local::now(),
            last_error: None,
        }));
        tokio::spawn(watch_reachability(health.clone(), db));
        health
    }

    pub fn to_http_response(&self) -> HttpResponse {
        match &self.last_error {
            Some(e) => {
                error!(
                    "/healthz reports database unreachable (last_checked: {:?}, error: {})",
                    self.last_checked, e
                );
                e.error_response()
            }
            None => {
                trace!(
                    "/healthz reports database reachable (last_checked: {:?})",
                    self.last_checked
                );
                HttpResponse::Ok().json(serde_json::json!({ "status": "healthy" }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DbHealth;
    use crate::db::error::DBError;
    use actix_web::http::StatusCode;
    use chrono::Local;

    #[test]
    fn response_follows_last_error() {
        let mut health = DbHealth {
            last_checked: Local::now(),
            last_error: None,
        };
        assert_eq!(health.to_http_response().status(), StatusCode::OK);

        let unreachable = DBError::PoolBuild {
            error: "no route to host".to_string(),
        };
        health.last_error = Some(unreachable.into());
        assert_eq!(
            health.to_http_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
