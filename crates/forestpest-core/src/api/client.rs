//! Resource API for the pest-control backend.
//!
//! This module provides the `ForestApi` struct: one method per backend
//! endpoint, each a single call through the [`Gateway`]. Payloads are
//! passed through as JSON; their business meaning belongs to the caller.

use std::fmt::Display;

use serde_json::{json, Value};

use super::endpoints::{self, evaluation, forest, pest, pesticide, prediction, treatment, user};
use super::ApiError;
use crate::gateway::{ApiRequest, Gateway, MultipartBody};

/// Query parameters as `(key, value)` pairs.
pub type Params<'a> = &'a [(&'a str, &'a str)];

/// Clone is cheap - the gateway is shared.
#[derive(Clone)]
pub struct ForestApi {
    gateway: Gateway,
}

impl ForestApi {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    async fn get(&self, path: impl Into<String>, params: Params<'_>) -> Result<Value, ApiError> {
        self.gateway
            .send(ApiRequest::get(path).query_pairs(params))
            .await
    }

    async fn post(&self, path: impl Into<String>, body: Value) -> Result<Value, ApiError> {
        self.gateway.send(ApiRequest::post(path).body(body)).await
    }

    async fn put(&self, path: impl Into<String>, body: Value) -> Result<Value, ApiError> {
        self.gateway.send(ApiRequest::put(path).body(body)).await
    }

    async fn delete(&self, path: impl Into<String>) -> Result<Value, ApiError> {
        self.gateway.send(ApiRequest::delete(path)).await
    }

    // ===== Session and account recovery =====

    pub async fn profile(&self) -> Result<Value, ApiError> {
        self.get(endpoints::auth::PROFILE, &[]).await
    }

    pub async fn register(&self, account: Value) -> Result<Value, ApiError> {
        self.post(endpoints::auth::REGISTER, account).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<Value, ApiError> {
        self.post(endpoints::auth::FORGOT_PASSWORD, json!({ "email": email }))
            .await
    }

    pub async fn verify_reset_code(&self, request: Value) -> Result<Value, ApiError> {
        self.post(endpoints::auth::VERIFY_RESET_CODE, request).await
    }

    pub async fn reset_password(&self, request: Value) -> Result<Value, ApiError> {
        self.post(endpoints::auth::RESET_PASSWORD, request).await
    }

    pub async fn health(&self) -> Result<Value, ApiError> {
        self.get(endpoints::HEALTH, &[]).await
    }

    // ===== Users =====

    pub async fn users(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(user::LIST, params).await
    }

    pub async fn user_detail(&self, id: impl Display) -> Result<Value, ApiError> {
        self.get(user::detail(id), &[]).await
    }

    pub async fn set_user_status(&self, id: impl Display, body: Value) -> Result<Value, ApiError> {
        self.put(user::status(id), body).await
    }

    /// Administrator reset of another user's password.
    pub async fn reset_user_password(&self, id: impl Display) -> Result<Value, ApiError> {
        self.post(user::reset_password(id), Value::Null).await
    }

    pub async fn own_profile(&self) -> Result<Value, ApiError> {
        self.get(user::PROFILE, &[]).await
    }

    pub async fn update_own_profile(&self, profile: Value) -> Result<Value, ApiError> {
        self.put(user::PROFILE, profile).await
    }

    pub async fn change_password(&self, request: Value) -> Result<Value, ApiError> {
        self.put(user::CHANGE_PASSWORD, request).await
    }

    // ===== Pest identification =====

    /// Upload an image for identification. `fields` are sent alongside the
    /// file as plain form fields.
    pub async fn identify_pest(
        &self,
        file_name: &str,
        content_type: &str,
        image: Vec<u8>,
        fields: Params<'_>,
    ) -> Result<Value, ApiError> {
        let form = fields
            .iter()
            .fold(MultipartBody::new(), |form, (k, v)| form.text(*k, *v))
            .file("image", file_name, content_type, image);
        self.gateway
            .send(ApiRequest::post(pest::IDENTIFY).multipart(form))
            .await
    }

    pub async fn pest_list(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(pest::LIST, params).await
    }

    pub async fn pest_detail(&self, id: impl Display) -> Result<Value, ApiError> {
        self.get(pest::detail(id), &[]).await
    }

    pub async fn identification_history(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(pest::HISTORY, params).await
    }

    pub async fn delete_identification_record(&self, id: impl Display) -> Result<Value, ApiError> {
        self.delete(pest::identification_record(id)).await
    }

    // ===== Treatment plans and tasks =====

    pub async fn treatment_plans(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(treatment::PLANS, params).await
    }

    pub async fn treatment_plan(&self, id: impl Display) -> Result<Value, ApiError> {
        self.get(treatment::plan(id), &[]).await
    }

    pub async fn create_treatment_plan(&self, plan: Value) -> Result<Value, ApiError> {
        self.post(treatment::PLANS, plan).await
    }

    pub async fn update_treatment_plan(
        &self,
        id: impl Display,
        plan: Value,
    ) -> Result<Value, ApiError> {
        self.put(treatment::plan(id), plan).await
    }

    pub async fn generate_treatment_plan(&self, request: Value) -> Result<Value, ApiError> {
        self.post(treatment::GENERATE, request).await
    }

    pub async fn treatment_tasks(&self, plan_id: impl Display) -> Result<Value, ApiError> {
        self.get(treatment::tasks(plan_id), &[]).await
    }

    pub async fn update_task_status(
        &self,
        task_id: impl Display,
        status: Value,
    ) -> Result<Value, ApiError> {
        self.put(treatment::task_status(task_id), status).await
    }

    pub async fn treatment_progress(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(treatment::PROGRESS, params).await
    }

    // ===== Pesticide inventory =====

    pub async fn pesticides(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(pesticide::LIST, params).await
    }

    pub async fn create_pesticide(&self, pesticide: Value) -> Result<Value, ApiError> {
        self.post(pesticide::CREATE, pesticide).await
    }

    pub async fn update_pesticide(
        &self,
        id: impl Display,
        pesticide: Value,
    ) -> Result<Value, ApiError> {
        self.put(pesticide::item(id), pesticide).await
    }

    pub async fn delete_pesticide(&self, id: impl Display) -> Result<Value, ApiError> {
        self.delete(pesticide::item(id)).await
    }

    pub async fn update_pesticide_stock(&self, update: Value) -> Result<Value, ApiError> {
        self.post(pesticide::STOCK_UPDATE, update).await
    }

    pub async fn pesticide_usage(
        &self,
        id: impl Display,
        params: Params<'_>,
    ) -> Result<Value, ApiError> {
        self.get(pesticide::usage(id), params).await
    }

    pub async fn stock_alerts(&self) -> Result<Value, ApiError> {
        self.get(pesticide::ALERTS, &[]).await
    }

    pub async fn pesticide_usage_stats(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(pesticide::USAGE_STATS, params).await
    }

    // ===== Effect evaluation =====

    pub async fn evaluations(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(evaluation::LIST, params).await
    }

    pub async fn evaluation(&self, id: impl Display) -> Result<Value, ApiError> {
        self.get(evaluation::item(id), &[]).await
    }

    pub async fn create_evaluation(&self, evaluation: Value) -> Result<Value, ApiError> {
        self.post(evaluation::CREATE, evaluation).await
    }

    pub async fn update_evaluation(
        &self,
        id: impl Display,
        evaluation: Value,
    ) -> Result<Value, ApiError> {
        self.put(evaluation::item(id), evaluation).await
    }

    pub async fn delete_evaluation(&self, id: impl Display) -> Result<Value, ApiError> {
        self.delete(evaluation::item(id)).await
    }

    pub async fn evaluation_report(&self, id: impl Display) -> Result<Value, ApiError> {
        self.get(evaluation::report(id), &[]).await
    }

    pub async fn evaluation_comparison(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(evaluation::COMPARISON, params).await
    }

    pub async fn evaluation_stats(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(evaluation::STATS, params).await
    }

    // ===== Prediction and early warning =====

    pub async fn predictions(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(prediction::LIST, params).await
    }

    pub async fn warnings(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(prediction::WARNINGS, params).await
    }

    pub async fn update_warning_status(
        &self,
        id: impl Display,
        status: Value,
    ) -> Result<Value, ApiError> {
        self.put(prediction::warning_status(id), status).await
    }

    pub async fn predict(&self, input: Value) -> Result<Value, ApiError> {
        self.post(prediction::PREDICT, input).await
    }

    pub async fn warning_map(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(prediction::WARNING_MAP, params).await
    }

    pub async fn warning_stats(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(prediction::WARNING_STATS, params).await
    }

    pub async fn prediction_accuracy(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(prediction::ACCURACY, params).await
    }

    // ===== Forest resources and knowledge base =====

    pub async fn forest_resources(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(forest::RESOURCES, params).await
    }

    pub async fn forest_resource(&self, id: impl Display) -> Result<Value, ApiError> {
        self.get(forest::resource(id), &[]).await
    }

    pub async fn knowledge(&self, params: Params<'_>) -> Result<Value, ApiError> {
        self.get(forest::KNOWLEDGE, params).await
    }

    pub async fn knowledge_entry(&self, id: impl Display) -> Result<Value, ApiError> {
        self.get(forest::knowledge_entry(id), &[]).await
    }

    pub async fn search_knowledge(&self, keyword: &str) -> Result<Value, ApiError> {
        self.get(forest::KNOWLEDGE_SEARCH, &[("keyword", keyword)])
            .await
    }
}
