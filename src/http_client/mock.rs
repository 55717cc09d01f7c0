//! Scripted HTTP fake for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{FetchError, HttpFetch, HttpResponse};

struct Route {
    needle: String,
    responses: VecDeque<Result<HttpResponse, FetchError>>,
}

/// Replays queued responses for URLs containing a needle.
///
/// The last queued response for a route repeats once the queue drains.
/// Unmatched URLs get a 404 with an empty body.
#[derive(Default)]
pub struct ScriptedFetch {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl ScriptedFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for URLs containing `needle`.
    pub fn on(&self, needle: &str, response: Result<HttpResponse, FetchError>) -> &Self {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| r.needle == needle) {
            Some(route) => route.responses.push_back(response),
            None => routes.push(Route {
                needle: needle.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
        self
    }

    pub fn on_json(&self, needle: &str, status: u16, body: serde_json::Value) -> &Self {
        self.on(needle, Ok(HttpResponse::json(status, &body)))
    }

    pub fn on_status(&self, needle: &str, status: u16) -> &Self {
        self.on(needle, Ok(HttpResponse::new(status, "")))
    }

    /// Every requested URL, in order.
    pub fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Number of requests whose URL contains `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.urls().iter().filter(|u| u.contains(needle)).count()
    }

    /// Headers sent with the most recent request.
    pub fn last_headers(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, h)| h.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HttpFetch for ScriptedFetch {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), headers.to_vec()));

        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.iter_mut().find(|r| url.contains(&r.needle)) else {
            return Ok(HttpResponse::new(404, ""));
        };
        if route.responses.len() > 1 {
            route.responses.pop_front().unwrap_or_else(|| Ok(HttpResponse::new(404, "")))
        } else {
            route
                .responses
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, "")))
        }
    }
}
