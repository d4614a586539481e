use database::DbConnection;

use crate::Plant;
use crate::prelude::*;

pub fn plant_changeset(common_name: &str, scientific_name: &str) -> Changeset<Plant> {
    Plant::changeset()
        .common_name(common_name)
        .scientific_name(scientific_name)
}

pub async fn create_plant(
    conn: &mut DbConnection,
    common_name: &str,
    scientific_name: &str,
) -> Plant {
    plant_changeset(common_name, scientific_name)
        .create(conn)
        .await
        .expect("Failed to create plant")
}
