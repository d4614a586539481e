use common::Version;
use tracing::debug;
use utoipa::OpenApi;

use super::plants;
use crate::error::InternalError;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Flora",
        description = "All HTTP endpoints of Flora",
        license(name = "LGPL", url = "https://www.gnu.org/licenses/lgpl-3.0.html"),
    ),
    paths(
        super::health,
        super::version,
        plants::list,
        plants::create,
        plants::get,
        plants::update,
        plants::delete,
    ),
    components(schemas(InternalError, Version, plants::PlantResponse)),
    tags(
        (name = "plants", description = "Botanical records and their attachments"),
    ),
)]
pub struct OpenApiRoot;

impl OpenApiRoot {
    pub fn build_openapi() -> utoipa::openapi::OpenApi {
        let openapi = Self::openapi();
        debug!(paths = openapi.paths.paths.len(), "OpenAPI document built");
        openapi
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::OpenApiRoot;

    #[test]
    fn every_route_is_documented() {
        let openapi = OpenApiRoot::build_openapi();
        let mut paths = openapi.paths.paths.keys().cloned().collect::<Vec<_>>();
        paths.sort();
        assert_eq!(
            paths,
            vec!["/api/plants", "/api/plants/{plant_id}", "/health", "/version"]
        );
        let plant_item = &openapi.paths.paths["/api/plants/{plant_id}"];
        assert!(plant_item.get.is_some());
        assert!(plant_item.put.is_some());
        assert!(plant_item.delete.is_some());
    }

    #[test]
    fn openapi_is_valid_yaml() {
        let openapi = OpenApiRoot::build_openapi();
        let yaml = serde_yaml::to_string(&openapi).expect("OpenAPI should serialize");
        assert!(yaml.contains("PlantResponse"));
    }
}
