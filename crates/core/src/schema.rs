mod column;
mod index;
mod table;

pub use column::{ColumnDefault, ColumnDefinition, ColumnType};
pub use index::{
    ForeignKeyAction, ForeignKeyDefinition, IndexColumn, IndexDefinition, IndexType,
};
pub use table::TableDefinition;
