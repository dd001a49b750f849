use utoipa::OpenApi;

use crate::common::response::ApiResponse;
use crate::modules::job::dto::{PushMessage, PushRequest};
use crate::modules::job::model::JobReport;

#[derive(OpenApi)]
#[openapi(
    paths(crate::modules::job::handler::process_video),
    components(schemas(PushRequest, PushMessage, JobReport, ApiResponse<JobReport>)),
    tags(
        (name = "Jobs", description = "Video transcoding jobs")
    )
)]
pub struct ApiDoc;
