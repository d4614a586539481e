use std::ops::DerefMut;

use database::DbConnection;
use database::tables::plant::dsl;
use diesel::AsChangeset;
use diesel::ExpressionMethods;
use diesel::Insertable;
use diesel::OptionalExtension;
use diesel::QueryDsl;
use diesel::Queryable;
use diesel::Selectable;
use diesel::SelectableHelper;
use diesel_async::RunQueryDsl;

use crate::Error;
use crate::prelude::*;

/// A botanical record, with optional geolocation and binary attachments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plant {
    pub id: Id,
    pub common_name: String,
    pub first_nations_name: Option<String>,
    pub scientific_name: String,
    pub first_nations_uses: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub kml_file: Option<Vec<u8>>,
    pub conservation_status: Option<String>,
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = database::tables::plant)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlantRow {
    id: i64,
    common_name: String,
    first_nations_name: Option<String>,
    scientific_name: String,
    first_nations_uses: Option<String>,
    description: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    kml_file: Option<Vec<u8>>,
    conservation_status: Option<String>,
    image: Option<Vec<u8>>,
}

impl From<PlantRow> for Plant {
    fn from(row: PlantRow) -> Self {
        Self {
            id: row.id,
            common_name: row.common_name,
            first_nations_name: row.first_nations_name,
            scientific_name: row.scientific_name,
            first_nations_uses: row.first_nations_uses,
            description: row.description,
            latitude: row.latitude,
            longitude: row.longitude,
            kml_file: row.kml_file,
            conservation_status: row.conservation_status,
            image: row.image,
        }
    }
}

/// The values given to an INSERT or UPDATE of a [Plant]
///
/// Absent values are left out of the statement: an INSERT stores `NULL`
/// and an UPDATE keeps the current value of the column.
#[derive(Debug, Clone, Default, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = database::tables::plant)]
pub struct PlantChangeset {
    pub common_name: Option<String>,
    pub first_nations_name: Option<String>,
    pub scientific_name: Option<String>,
    pub first_nations_uses: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub kml_file: Option<Vec<u8>>,
    pub conservation_status: Option<String>,
    pub image: Option<Vec<u8>>,
}

macro_rules! changeset_setters {
    ($($field:ident: $ty:ty),* $(,)?) => {
        impl PlantChangeset {
            $(
                #[must_use = "builder methods are intended to be chained"]
                pub fn $field(mut self, $field: impl Into<$ty>) -> Self {
                    self.$field = Some($field.into());
                    self
                }
            )*
        }
    };
}

changeset_setters! {
    common_name: String,
    first_nations_name: String,
    scientific_name: String,
    first_nations_uses: String,
    description: String,
    latitude: f64,
    longitude: f64,
    kml_file: Vec<u8>,
    conservation_status: String,
    image: Vec<u8>,
}

impl PlantChangeset {
    /// Whether no column would be written by this changeset
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl Model for Plant {
    type Row = PlantRow;
    type Changeset = PlantChangeset;
}

impl List for Plant {
    type Error = Error;

    async fn list(conn: &mut DbConnection) -> Result<Vec<Self>, Self::Error> {
        let rows = dsl::plant
            .order(dsl::id.asc())
            .select(PlantRow::as_select())
            .load::<PlantRow>(conn.write().await.deref_mut())
            .await?;
        Ok(rows.into_iter().map(Plant::from_row).collect())
    }
}

impl Create<Plant> for PlantChangeset {
    type Error = Error;

    async fn create(self, conn: &mut DbConnection) -> Result<Plant, Self::Error> {
        // An INSERT without any column is not valid SQL, report the first required one
        if self.common_name.is_none() {
            return Err(Error::NotNullViolation {
                column: "common_name".to_owned(),
            });
        }
        let row = diesel::insert_into(dsl::plant)
            .values(self)
            .returning(PlantRow::as_returning())
            .get_result::<PlantRow>(conn.write().await.deref_mut())
            .await?;
        tracing::debug!(id = row.id, "plant created");
        Ok(row.into())
    }
}

impl Retrieve for Plant {
    type Error = Error;

    async fn retrieve(conn: &mut DbConnection, id: Id) -> Result<Option<Self>, Self::Error> {
        let row = dsl::plant
            .find(id)
            .select(PlantRow::as_select())
            .first::<PlantRow>(conn.write().await.deref_mut())
            .await
            .optional()?;
        Ok(row.map(Plant::from_row))
    }

    async fn exists(conn: &mut DbConnection, id: Id) -> Result<bool, Self::Error> {
        let exists = diesel::select(diesel::dsl::exists(dsl::plant.find(id)))
            .get_result::<bool>(conn.write().await.deref_mut())
            .await?;
        Ok(exists)
    }
}

impl Update<Plant> for PlantChangeset {
    type Error = Error;

    async fn update(self, conn: &mut DbConnection, id: Id) -> Result<Option<Plant>, Self::Error> {
        if self.is_empty() {
            return Plant::retrieve(conn, id).await;
        }
        let row = diesel::update(dsl::plant.find(id))
            .set(self)
            .returning(PlantRow::as_returning())
            .get_result::<PlantRow>(conn.write().await.deref_mut())
            .await
            .optional()?;
        Ok(row.map(Plant::from_row))
    }
}

impl DeleteStatic for Plant {
    type Error = Error;

    async fn delete_static(conn: &mut DbConnection, id: Id) -> Result<bool, Self::Error> {
        let deleted = diesel::delete(dsl::plant.find(id))
            .execute(conn.write().await.deref_mut())
            .await?;
        Ok(deleted == 1)
    }
}
