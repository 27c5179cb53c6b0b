#![allow(dead_code)]

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use idoql::{
    config::AppConfig,
    query::{
        dialect::{ConnectionDescriptor, Dialect},
        version::SchemaVersion,
        QueryEngine,
    },
    server,
    state::AppState,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const API_KEY: &str = "test-key";

pub struct Harness {
    router: Router,
}

impl Harness {
    pub fn new(dialect: Dialect) -> Self {
        let mut config = AppConfig::embedded(ConnectionDescriptor::new(dialect, "icinga_"));
        config.schema_version = Some(SchemaVersion::new(1, 14, 3));
        config.api_key = Some(API_KEY.to_string());
        let config = Arc::new(config);
        let engine = QueryEngine::from_config(Arc::clone(&config));
        Self {
            router: server::router(AppState::new(config, engine)),
        }
    }

    pub async fn translate<T: Serialize>(&self, payload: &T) -> (StatusCode, Value) {
        self.send(post("/translate", payload, Some(API_KEY))).await
    }

    pub async fn translate_without_key<T: Serialize>(&self, payload: &T) -> (StatusCode, Value) {
        self.send(post("/translate", payload, None)).await
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .header("x-api-key", API_KEY)
            .body(Body::empty())
            .expect("failed to build request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle the request");
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), 4 * 1024 * 1024)
            .await
            .expect("response body should be readable");
        let value =
            serde_json::from_slice::<Value>(&bytes).expect("response body should be valid JSON");
        (status, value)
    }
}

fn post<T: Serialize>(path: &str, payload: &T, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let body = serde_json::to_vec(payload).expect("request payload should serialize");
    builder
        .body(Body::from(body))
        .expect("failed to build request")
}
