//! CRM metadata handlers

use axum::{extract::{Path, State}, Json};

use domain_crm::FieldMetadata;

use crate::AppState;

/// Enumeration labels of a CRM field, served from the TTL cache
pub async fn field_metadata(
    State(state): State<AppState>,
    Path(field): Path<String>,
) -> Json<FieldMetadata> {
    Json(state.field_cache.get(&field).await)
}
