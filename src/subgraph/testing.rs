use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::client::GraphQlTransport;

/// Replays canned replies in order and records every request.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<Value>>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Result<Value>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphQlTransport for ScriptedTransport {
    async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted reply")))
    }
}
