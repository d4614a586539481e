//! The traits describing how models are stored, but not the models themselves
//!
//! Every Flora table is keyed by an autoincremented [Id].

use database::DbConnection;

/// Primary key of every model
pub type Id = i64;

/// A struct that can be saved to and read from the database using diesel's interface
///
/// `Self::Row` precisely maps the columns of the model's table and is what
/// the SQL queries load. `Self::Changeset` maps the same columns wrapped in
/// `Option`: only the `Some` ones are written by an INSERT or an UPDATE.
pub trait Model: std::fmt::Debug + Clone + Sized + Send {
    type Row: Into<Self> + Send;
    type Changeset: Default + Send;

    /// Returns an empty changeset for this model
    fn changeset() -> Self::Changeset {
        Self::Changeset::default()
    }

    fn from_row(row: Self::Row) -> Self {
        row.into()
    }
}

/// A type alias for the [Model::Changeset] associated type
pub type Changeset<M> = <M as Model>::Changeset;

/// Reads every row of a model's table
pub trait List: Model {
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Lists every row of the table, in insertion order
    async fn list(conn: &mut DbConnection) -> Result<Vec<Self>, Self::Error>;
}

/// Implemented by the changeset of a [Model] to insert it as a new row
pub trait Create<M: Model>: Sized {
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Inserts the changeset values and returns the stored model, with its new [Id]
    async fn create(self, conn: &mut DbConnection) -> Result<M, Self::Error>;
}

pub trait Retrieve: Model {
    type Error: std::error::Error + From<crate::Error> + Send;

    async fn retrieve(conn: &mut DbConnection, id: Id) -> Result<Option<Self>, Self::Error>;

    /// Just like [Retrieve::retrieve] but returns `Err(fail())` if the row was not found
    async fn retrieve_or_fail<E, F>(conn: &mut DbConnection, id: Id, fail: F) -> Result<Self, E>
    where
        E: From<Self::Error>,
        F: FnOnce() -> E + Send,
    {
        Self::retrieve(conn, id).await?.ok_or_else(fail)
    }

    async fn exists(conn: &mut DbConnection, id: Id) -> Result<bool, Self::Error>;
}

/// Implemented by the changeset of a [Model] to patch an existing row
pub trait Update<M: Model>: Sized {
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Writes the changeset values into the row #`id` and returns the updated model
    ///
    /// Columns absent from the changeset keep their current value. `None` means
    /// the row doesn't exist.
    async fn update(self, conn: &mut DbConnection, id: Id) -> Result<Option<M>, Self::Error>;

    /// Just like [Update::update] but returns `Err(fail())` if the row was not found
    async fn update_or_fail<E, F>(self, conn: &mut DbConnection, id: Id, fail: F) -> Result<M, E>
    where
        E: From<Self::Error>,
        F: FnOnce() -> E + Send,
    {
        self.update(conn, id).await?.ok_or_else(fail)
    }
}

/// Deletes rows without loading them first
pub trait DeleteStatic: Model {
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Returns whether a row was deleted
    async fn delete_static(conn: &mut DbConnection, id: Id) -> Result<bool, Self::Error>;

    /// Just like [DeleteStatic::delete_static] but returns `Err(fail())` if there was no row #`id`
    async fn delete_static_or_fail<E, F>(
        conn: &mut DbConnection,
        id: Id,
        fail: F,
    ) -> Result<(), E>
    where
        E: From<Self::Error>,
        F: FnOnce() -> E + Send,
    {
        if Self::delete_static(conn, id).await? {
            Ok(())
        } else {
            Err(fail())
        }
    }
}
