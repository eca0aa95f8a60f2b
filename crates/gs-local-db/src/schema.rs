//! Database schema definitions and constants.

use rusqlite::Connection;

// Table names
pub const TABLE_SCHEMA_MIGRATIONS: &str = "schema_migrations";
pub const TABLE_APPAREILS: &str = "appareils";

// File name of every environment's database
pub const DATABASE_FILE_NAME: &str = "gestia.db";

// Column names for schema_migrations table
pub mod schema_migrations {
    pub const ID: &str = "id";
    pub const VERSION: &str = "version";
    pub const DESCRIPTION: &str = "description";
    pub const APPLIED_AT: &str = "applied_at";
}

// Column names for appareils table
pub mod appareils {
    // Base columns, present since the table was first created
    pub const ID_APPAREIL: &str = "ID_Appareil";
    pub const MARQUE: &str = "Marque";
    pub const MODELE: &str = "Modele";
    pub const DATE_RECEPTION: &str = "DateReception";
    pub const ETAT: &str = "Etat";
    pub const DATE_MISE_EN_VENTE: &str = "DateMiseEnVente";

    // Added by migrations
    pub const SERIE: &str = "Serie";
    pub const CAPACITE: &str = "Capacite";
    pub const TECHNOLOGIE: &str = "Technologie";
    pub const VARIANTE: &str = "Variante";
    pub const REFERENCE_COMPLETE: &str = "ReferenceComplete";
    pub const LABEL: &str = "Label";
    pub const ACTIONS_A_FAIRE: &str = "ActionsAFaire";
    pub const SOUCIS_MACHINE: &str = "SoucisMachine";
    pub const NUMERO_SERIE: &str = "NumeroSerie";
}

/// Create the tables a fresh environment starts from.
///
/// Only the base columns of `appareils` are created here; everything added
/// later belongs to the migration catalog.
pub fn create_base_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS appareils (
            ID_Appareil VARCHAR(50) PRIMARY KEY,
            Marque VARCHAR(100) NOT NULL,
            Modele VARCHAR(100) NOT NULL,
            DateReception DATE NOT NULL,
            Etat VARCHAR(13) NOT NULL,
            DateMiseEnVente DATE
        );
        "#,
    )
}
