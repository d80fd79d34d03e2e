// Database schema for the product catalog
diesel::table! {
    products (id) {
        id -> Integer,
        name -> Text,
        quantity -> Integer,
        price -> Double,
        image_uri -> Nullable<Text>, // Opaque reference to an external image
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

/// DDL for the `products` table. `IF NOT EXISTS` makes it safe to run on
/// every start.
pub const CREATE_PRODUCTS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        price REAL NOT NULL,
        image_uri TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )";
