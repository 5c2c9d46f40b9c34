use utoipa::OpenApi;

use crate::routes::{callback, health, music, tasks, upload};

#[derive(OpenApi)]
#[openapi(info(
    title = "melodia-server",
    description = "Asynchronous music and lyrics generation API",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(music::MusicApi::openapi());
    root.merge(tasks::TasksApi::openapi());
    root.merge(callback::CallbackApi::openapi());
    root.merge(upload::UploadApi::openapi());
    root
}
