use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::Form;
use axum::extract::FromRequest;
use axum::extract::FromRequestParts;
use axum::extract::Multipart;
use axum::extract::Path;
use axum::extract::RawPathParams;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use database::DbConnectionPool;
use flora_models::Plant;
use flora_models::plant::PlantChangeset;
use flora_models::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use serde_with::base64::Base64;
use serde_with::serde_as;
use thiserror::Error;
use utoipa::IntoParams;
use utoipa::ToSchema;

use crate::error::FloraError;
use crate::error::InternalError;
use crate::error::Result;

#[derive(Debug, Error)]
pub enum PlantError {
    #[error("Plant '{plant_id}' could not be found")]
    NotFound { plant_id: i64 },

    #[error("Plant '{plant_id}' could not be found, plant ids are integers")]
    InvalidId { plant_id: String },

    #[error("Field '{field}' is required")]
    MissingField { field: String },

    #[error("Field '{field}' must be a number, got '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("A field value violates the constraint '{constraint}'")]
    ConstraintViolation { constraint: String },

    #[error("Invalid form: {reason}")]
    InvalidForm { reason: String },

    #[error("Unsupported content type '{content_type}'")]
    UnsupportedContentType { content_type: String },

    #[error(transparent)]
    Database(flora_models::Error),
}

impl From<flora_models::Error> for PlantError {
    fn from(e: flora_models::Error) -> Self {
        match e {
            flora_models::Error::NotNullViolation { column } => Self::MissingField { field: column },
            flora_models::Error::CheckViolation { constraint } => {
                Self::ConstraintViolation { constraint }
            }
            e => Self::Database(e),
        }
    }
}

impl FloraError for PlantError {
    fn get_status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::InvalidId { .. } => StatusCode::NOT_FOUND,
            Self::MissingField { .. }
            | Self::InvalidNumber { .. }
            | Self::ConstraintViolation { .. }
            | Self::InvalidForm { .. } => StatusCode::BAD_REQUEST,
            Self::UnsupportedContentType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Database(e) => e.get_status(),
        }
    }

    fn get_type(&self) -> &str {
        match self {
            Self::NotFound { .. } => "flora:plants:NotFound",
            Self::InvalidId { .. } => "flora:plants:InvalidId",
            Self::MissingField { .. } => "flora:plants:MissingField",
            Self::InvalidNumber { .. } => "flora:plants:InvalidNumber",
            Self::ConstraintViolation { .. } => "flora:plants:ConstraintViolation",
            Self::InvalidForm { .. } => "flora:plants:InvalidForm",
            Self::UnsupportedContentType { .. } => "flora:plants:UnsupportedContentType",
            Self::Database(e) => e.get_type(),
        }
    }

    fn context(&self) -> HashMap<String, Value> {
        let context = match self {
            Self::NotFound { plant_id } => json!({ "plant_id": plant_id }),
            Self::InvalidId { plant_id } => json!({ "plant_id": plant_id }),
            Self::MissingField { field } => json!({ "field": field }),
            Self::InvalidNumber { field, value } => json!({ "field": field, "value": value }),
            Self::ConstraintViolation { constraint } => json!({ "constraint": constraint }),
            Self::UnsupportedContentType { content_type } => {
                json!({ "content_type": content_type })
            }
            Self::InvalidForm { .. } | Self::Database(_) => return HashMap::new(),
        };
        serde_json::from_value(context).unwrap_or_default()
    }
}

#[derive(IntoParams, Deserialize)]
#[into_params(parameter_in = Path)]
pub(in crate::views) struct PlantIdParam {
    /// The id of a plant
    plant_id: i64,
}

/// The `{plant_id}` of the request path
///
/// An id that isn't an integer can't match any plant: it is answered with a 404
/// carrying the usual error body instead of axum's plain text rejection.
pub(in crate::views) struct PlantId(i64);

impl<S: Send + Sync> FromRequestParts<S> for PlantId {
    type Rejection = InternalError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<PlantIdParam>::from_request_parts(parts, state).await {
            Ok(Path(PlantIdParam { plant_id })) => Ok(Self(plant_id)),
            Err(rejection) => {
                tracing::debug!(%rejection, "malformed plant id");
                let plant_id = RawPathParams::from_request_parts(parts, state)
                    .await
                    .ok()
                    .and_then(|params| {
                        params
                            .iter()
                            .find(|(name, _)| *name == "plant_id")
                            .map(|(_, value)| value.to_owned())
                    })
                    .unwrap_or_default();
                Err(PlantError::InvalidId { plant_id }.into())
            }
        }
    }
}

/// A plant as returned by the API
///
/// Attachments are standard base64 strings, `null` when absent.
#[serde_as]
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, PartialEq))]
pub struct PlantResponse {
    pub id: i64,
    pub common_name: String,
    pub first_nations_name: Option<String>,
    pub scientific_name: String,
    pub first_nations_uses: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde_as(as = "Option<Base64>")]
    #[schema(value_type = Option<String>, format = Byte)]
    pub kml_file: Option<Vec<u8>>,
    pub conservation_status: Option<String>,
    #[serde_as(as = "Option<Base64>")]
    #[schema(value_type = Option<String>, format = Byte)]
    pub image: Option<Vec<u8>>,
}

impl From<Plant> for PlantResponse {
    fn from(plant: Plant) -> Self {
        Self {
            id: plant.id,
            common_name: plant.common_name,
            first_nations_name: plant.first_nations_name,
            scientific_name: plant.scientific_name,
            first_nations_uses: plant.first_nations_uses,
            description: plant.description,
            latitude: plant.latitude,
            longitude: plant.longitude,
            kml_file: plant.kml_file.filter(|content| !content.is_empty()),
            conservation_status: plant.conservation_status,
            image: plant.image.filter(|content| !content.is_empty()),
        }
    }
}

#[derive(ToSchema)]
#[allow(unused)] // Schema only
struct PlantCreateForm {
    common_name: String,
    first_nations_name: Option<String>,
    scientific_name: String,
    first_nations_uses: Option<String>,
    description: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[schema(value_type = Option<String>, format = Binary)]
    kml_file: Option<Vec<u8>>,
    conservation_status: Option<String>,
    #[schema(value_type = Option<String>, format = Binary)]
    image: Option<Vec<u8>>,
}

#[derive(ToSchema)]
#[allow(unused)] // Schema only
struct PlantUpdateForm {
    common_name: Option<String>,
    first_nations_name: Option<String>,
    scientific_name: Option<String>,
    first_nations_uses: Option<String>,
    description: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[schema(value_type = Option<String>, format = Binary)]
    kml_file: Option<Vec<u8>>,
    conservation_status: Option<String>,
    #[schema(value_type = Option<String>, format = Binary)]
    image: Option<Vec<u8>>,
}

/// The fields of a plant write request, decoded from a multipart or urlencoded body
///
/// Only the first occurrence of a field is kept.
#[derive(Debug, Default, PartialEq)]
pub(in crate::views) struct PlantForm {
    fields: HashMap<String, String>,
    kml_file: Option<Vec<u8>>,
    image: Option<Vec<u8>>,
}

impl PlantForm {
    fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut form = Self::default();
        for (name, value) in pairs {
            form.fields.entry(name).or_insert(value);
        }
        form
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, PlantError> {
        let invalid_form = |e: axum::extract::multipart::MultipartError| PlantError::InvalidForm {
            reason: e.body_text(),
        };
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
            let Some(name) = field.name().map(str::to_owned) else {
                tracing::debug!("ignoring unnamed multipart field");
                continue;
            };
            match name.as_str() {
                "kml_file" | "image" => {
                    let content = field.bytes().await.map_err(invalid_form)?.to_vec();
                    let attachment = if name == "kml_file" {
                        &mut form.kml_file
                    } else {
                        &mut form.image
                    };
                    if attachment.is_none() {
                        *attachment = Some(content);
                    }
                }
                _ => {
                    let value = field.text().await.map_err(invalid_form)?;
                    form.fields.entry(name).or_insert(value);
                }
            }
        }
        Ok(form)
    }

    /// Builds the changeset of the fields present in the form
    ///
    /// Blank coordinates and empty attachments count as absent.
    fn into_changeset(mut self) -> Result<PlantChangeset, PlantError> {
        let mut changeset = Plant::changeset();
        changeset.common_name = self.fields.remove("common_name");
        changeset.first_nations_name = self.fields.remove("first_nations_name");
        changeset.scientific_name = self.fields.remove("scientific_name");
        changeset.first_nations_uses = self.fields.remove("first_nations_uses");
        changeset.description = self.fields.remove("description");
        changeset.latitude = parse_coordinate("latitude", self.fields.remove("latitude"))?;
        changeset.longitude = parse_coordinate("longitude", self.fields.remove("longitude"))?;
        changeset.conservation_status = self.fields.remove("conservation_status");
        changeset.kml_file = self.kml_file.filter(|content| !content.is_empty());
        changeset.image = self.image.filter(|content| !content.is_empty());
        if !self.fields.is_empty() {
            tracing::debug!(fields = ?self.fields.keys(), "ignoring unknown form fields");
        }
        Ok(changeset)
    }
}

impl<S: Send + Sync> FromRequest<S> for PlantForm {
    type Rejection = InternalError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Some(content_type) = req.headers().get(CONTENT_TYPE) else {
            return Ok(Self::default());
        };
        let content_type = String::from_utf8_lossy(content_type.as_bytes()).into_owned();
        let unsupported = || PlantError::UnsupportedContentType {
            content_type: content_type.clone(),
        };
        let mime: mime::Mime = content_type.parse().map_err(|_| unsupported())?;
        match (mime.type_(), mime.subtype()) {
            (mime::MULTIPART, mime::FORM_DATA) => {
                let multipart = Multipart::from_request(req, state).await.map_err(|e| {
                    PlantError::InvalidForm {
                        reason: e.body_text(),
                    }
                })?;
                Ok(Self::from_multipart(multipart).await?)
            }
            (mime::APPLICATION, mime::WWW_FORM_URLENCODED) => {
                let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                    .await
                    .map_err(|e| PlantError::InvalidForm {
                        reason: e.body_text(),
                    })?;
                Ok(Self::from_pairs(pairs))
            }
            _ => Err(unsupported().into()),
        }
    }
}

fn parse_coordinate(field: &'static str, value: Option<String>) -> Result<Option<f64>, PlantError> {
    let Some(value) = value.filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    match value.trim().parse::<f64>() {
        Ok(coordinate) if coordinate.is_finite() => Ok(Some(coordinate)),
        _ => Err(PlantError::InvalidNumber { field, value }),
    }
}

fn require_text(value: &Option<String>, field: &str) -> Result<(), PlantError> {
    match value {
        Some(value) if !value.is_empty() => Ok(()),
        _ => Err(PlantError::MissingField {
            field: field.to_owned(),
        }),
    }
}

/// List all the plants, in creation order
#[utoipa::path(
    get, path = "/api/plants",
    tag = "plants",
    responses(
        (status = 200, description = "All the plants", body = Vec<PlantResponse>),
    )
)]
pub(in crate::views) async fn list(
    State(db_pool): State<Arc<DbConnectionPool>>,
) -> Result<Json<Vec<PlantResponse>>> {
    let conn = &mut db_pool.get().await?;
    let plants = Plant::list(conn).await?;
    Ok(Json(plants.into_iter().map(PlantResponse::from).collect()))
}

/// Create a plant
///
/// `common_name` and `scientific_name` are required.
#[utoipa::path(
    post, path = "/api/plants",
    tag = "plants",
    request_body(content = PlantCreateForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "The created plant", body = PlantResponse),
        (status = 400, description = "A field is missing or invalid", body = InternalError),
        (status = 415, description = "The body is neither multipart nor urlencoded", body = InternalError),
    )
)]
pub(in crate::views) async fn create(
    State(db_pool): State<Arc<DbConnectionPool>>,
    form: PlantForm,
) -> Result<(StatusCode, Json<PlantResponse>)> {
    let changeset = form.into_changeset()?;
    require_text(&changeset.common_name, "common_name")?;
    require_text(&changeset.scientific_name, "scientific_name")?;

    let conn = &mut db_pool.get().await?;
    let plant: Plant = changeset.create(conn).await.map_err(PlantError::from)?;
    tracing::info!(plant_id = plant.id, "plant created");
    Ok((StatusCode::CREATED, Json(plant.into())))
}

/// Retrieve a plant
#[utoipa::path(
    get, path = "/api/plants/{plant_id}",
    tag = "plants",
    params(PlantIdParam),
    responses(
        (status = 200, description = "The requested plant", body = PlantResponse),
        (status = 404, description = "The plant does not exist", body = InternalError),
    )
)]
pub(in crate::views) async fn get(
    State(db_pool): State<Arc<DbConnectionPool>>,
    PlantId(plant_id): PlantId,
) -> Result<Json<PlantResponse>> {
    let conn = &mut db_pool.get().await?;
    let plant = Plant::retrieve_or_fail(conn, plant_id, || PlantError::NotFound { plant_id })
        .await?;
    Ok(Json(plant.into()))
}

/// Update a plant
///
/// Omitted fields keep their current value, attachments are only replaced when a new one is sent.
#[utoipa::path(
    put, path = "/api/plants/{plant_id}",
    tag = "plants",
    params(PlantIdParam),
    request_body(content = PlantUpdateForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "The updated plant", body = PlantResponse),
        (status = 400, description = "A field is invalid", body = InternalError),
        (status = 404, description = "The plant does not exist", body = InternalError),
        (status = 415, description = "The body is neither multipart nor urlencoded", body = InternalError),
    )
)]
pub(in crate::views) async fn update(
    State(db_pool): State<Arc<DbConnectionPool>>,
    PlantId(plant_id): PlantId,
    request: Request,
) -> Result<Json<PlantResponse>> {
    // The body is only decoded once the plant is known to exist, and without
    // holding a connection while it is received
    let exists = {
        let conn = &mut db_pool.get().await?;
        Plant::exists(conn, plant_id).await?
    };
    if !exists {
        return Err(PlantError::NotFound { plant_id }.into());
    }
    let changeset = PlantForm::from_request(request, &()).await?.into_changeset()?;
    let conn = &mut db_pool.get().await?;
    let plant = changeset
        .update_or_fail(conn, plant_id, || PlantError::NotFound { plant_id })
        .await?;
    Ok(Json(plant.into()))
}

/// Delete a plant
#[utoipa::path(
    delete, path = "/api/plants/{plant_id}",
    tag = "plants",
    params(PlantIdParam),
    responses(
        (status = 204, description = "The plant was deleted"),
        (status = 404, description = "The plant does not exist", body = InternalError),
    )
)]
pub(in crate::views) async fn delete(
    State(db_pool): State<Arc<DbConnectionPool>>,
    PlantId(plant_id): PlantId,
) -> Result<StatusCode> {
    let conn = &mut db_pool.get().await?;
    Plant::delete_static_or_fail(conn, plant_id, || PlantError::NotFound { plant_id }).await?;
    tracing::info!(plant_id, "plant deleted");
    Ok(StatusCode::NO_CONTENT)
}
