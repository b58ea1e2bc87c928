//! Registry of answers for server-initiated traffic.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

type RequestPolicy = Box<dyn Fn(&Value) -> Value + Send + Sync>;
type NotificationPolicy = Box<dyn Fn(&Value) + Send + Sync>;

/// How the client reacts to requests and notifications the server sends.
///
/// Requests without a registered policy are answered with `MethodNotFound`;
/// notifications without one are logged at debug level and dropped.
#[derive(Default)]
pub struct ResponsePolicies {
    requests: HashMap<String, RequestPolicy>,
    notifications: HashMap<String, NotificationPolicy>,
}

impl ResponsePolicies {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the answer for a server request.
    pub fn on_request<F>(&mut self, method: impl Into<String>, policy: F) -> &mut Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.requests.insert(method.into(), Box::new(policy));
        self
    }

    /// Registers the reaction to a server notification.
    pub fn on_notification<F>(&mut self, method: impl Into<String>, policy: F) -> &mut Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.notifications.insert(method.into(), Box::new(policy));
        self
    }

    /// Computes the result for a server request, or `None` when unhandled.
    #[must_use]
    pub fn answer(&self, method: &str, params: &Value) -> Option<Value> {
        self.requests.get(method).map(|policy| policy(params))
    }

    /// Runs the notification policy; returns `false` when none is registered.
    pub fn observe(&self, method: &str, params: &Value) -> bool {
        self.notifications
            .get(method)
            .map(|policy| policy(params))
            .is_some()
    }
}

impl fmt::Debug for ResponsePolicies {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut requests: Vec<&str> = self.requests.keys().map(String::as_str).collect();
        let mut notifications: Vec<&str> =
            self.notifications.keys().map(String::as_str).collect();
        requests.sort_unstable();
        notifications.sort_unstable();
        formatter
            .debug_struct("ResponsePolicies")
            .field("requests", &requests)
            .field("notifications", &notifications)
            .finish()
    }
}
