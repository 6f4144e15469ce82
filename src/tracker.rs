//! Status tracking for responses that pass through a middleware.
//!
//! A handler may or may not choose a status. Code running after the handler
//! returns still needs to know what went on the wire, so the tracker
//! observes each response on its way out and remembers the status without
//! touching the response itself.

use http::StatusCode;

use crate::response::Response;

/// Records the status of the responses it observes.
///
/// Starts out at `200 OK`, the status a response gets when none is set.
#[derive(Clone, Copy, Debug)]
pub struct StatusTracker {
    status: StatusCode,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self { status: StatusCode::OK }
    }

    /// Records the status `response` carries, if one was set, and hands the
    /// response back unchanged.
    pub fn observe(&mut self, response: Response) -> Response {
        if let Some(status) = response.explicit_status() {
            self.status = status;
        }
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl Default for StatusTracker {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_ok_when_status_never_set() {
        let mut tracker = StatusTracker::new();
        let res = tracker.observe(Response::text("body"));
        assert_eq!(tracker.status(), StatusCode::OK);
        assert_eq!(res.into_inner().status(), StatusCode::OK);
    }

    #[test]
    fn reports_explicit_status() {
        let mut tracker = StatusTracker::new();
        let res = tracker.observe(Response::status(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(tracker.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.into_inner().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn forwards_response_untouched() {
        let mut tracker = StatusTracker::new();
        let res = tracker.observe(
            Response::builder()
                .status(StatusCode::CREATED)
                .header("location", "/items/9")
                .text("made"),
        );
        assert_eq!(res.headers()["location"], "/items/9");
        assert_eq!(res.body().as_ref(), b"made");
    }
}
