//! Acting-user extraction.
//!
//! Authentication lives in the fronting proxy; this service only needs the
//! id of the user a request acts as. The proxy forwards it in the
//! `x-acting-user` header, and this middleware parses it into the depot for
//! handlers that attribute writes.

use salvo::Depot;
use uuid::Uuid;

use satchel_core::constants::ACTING_USER_HEADER;

pub const ACTING_USER_DEPOT_KEY: &str = "acting_user";

pub struct ActingUserMiddleware;

#[salvo::async_trait]
impl salvo::Handler for ActingUserMiddleware {
    #[tracing::instrument(skip(self, req, depot, _res, _ctrl), fields(
        method = %req.method(),
        path = %req.uri().path()
    ))]
    async fn handle(
        &self,
        req: &mut salvo::Request,
        depot: &mut Depot,
        _res: &mut salvo::Response,
        _ctrl: &mut salvo::FlowCtrl,
    ) {
        let acting_user = req
            .headers()
            .get(ACTING_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok());

        if let Some(user_id) = acting_user {
            tracing::trace!(user_id = %user_id, "Acting user resolved");
            depot.insert(ACTING_USER_DEPOT_KEY, user_id);
        } else {
            tracing::trace!("No acting user header on request");
        }
    }
}

/// Returns the acting user id for this request, if the proxy supplied one.
#[must_use]
pub fn acting_user(depot: &Depot) -> Option<Uuid> {
    depot.get::<Uuid>(ACTING_USER_DEPOT_KEY).ok().copied()
}
