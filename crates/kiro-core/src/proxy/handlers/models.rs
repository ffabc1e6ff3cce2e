use axum::response::Json;

use crate::proxy::mappers::model_mapping::ModelList;
use crate::proxy::mappers::list_models;

pub async fn handle_list_models() -> Json<ModelList> {
    Json(list_models())
}
