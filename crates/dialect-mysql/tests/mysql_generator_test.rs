use sqlbridge_core::{
    AlterOp, ColumnDefault, ColumnDefinition, ColumnType, ConfigError, Dialect, Error,
    ForeignKeyAction, ForeignKeyDefinition, IndexColumn, IndexDefinition, IndexType, Statement,
    TableDefinition, TableName, Value,
};
use sqlbridge_dialect_mysql::MysqlDialect;

fn stock_table() -> TableDefinition {
    TableDefinition::new("t")
        .set_comment("Stock levels")
        .add_column(
            ColumnDefinition::new("id", ColumnType::Integer)
                .identity()
                .primary(1),
        )
        .add_column(
            ColumnDefinition::new("sku", ColumnType::Varchar)
                .length(32)
                .not_null(),
        )
        .add_column(ColumnDefinition::new("qty", ColumnType::Integer))
        .add_index(IndexDefinition::new("", IndexType::Unique, ["sku"]))
}

fn single(statements: Vec<Statement>) -> String {
    assert_eq!(statements.len(), 1, "{statements:?}");
    statements
        .into_iter()
        .next()
        .map(|statement| statement.sql)
        .unwrap_or_default()
}

fn alter(op: AlterOp) -> String {
    single(
        MysqlDialect
            .alter_table(&stock_table(), &op)
            .expect("alter should render"),
    )
}

#[test]
fn create_table_inlines_keys_and_table_options() {
    let sql = single(
        MysqlDialect
            .create_table(&stock_table(), false)
            .expect("definition should render"),
    );
    assert_eq!(
        sql,
        "CREATE TABLE `t` (`id` INT NOT NULL AUTO_INCREMENT, `sku` VARCHAR(32) NOT NULL, \
         `qty` INT NULL, PRIMARY KEY (`id`), UNIQUE INDEX `T_SKU` (`sku`)) \
         ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COMMENT='Stock levels'"
    );
}

#[test]
fn column_attributes_follow_the_type() {
    let table = TableDefinition::new("events")
        .in_schema("app")
        .set_comment("It's logged")
        .set_option("engine", "MyISAM")
        .set_option("collate", "utf8mb4_bin")
        .add_column(
            ColumnDefinition::new("id", ColumnType::BigInt)
                .unsigned(true)
                .identity()
                .primary(1)
                .comment("Event id"),
        )
        .add_column(
            ColumnDefinition::new("updated_at", ColumnType::Timestamp)
                .default_value(ColumnDefault::NowOnUpdate),
        )
        .add_column(
            ColumnDefinition::new("note", ColumnType::Text)
                .default_value(ColumnDefault::Literal(Value::from("n/a"))),
        )
        .add_column(
            ColumnDefinition::new("price", ColumnType::Decimal)
                .decimal(12, 4)
                .not_null()
                .default_value(ColumnDefault::Literal(Value::Int(0))),
        )
        .add_index(IndexDefinition {
            name: "FTI_EVENTS_NOTE".to_string(),
            index_type: IndexType::Fulltext,
            columns: vec![IndexColumn::new("note")],
        });
    let sql = single(
        MysqlDialect
            .create_table(&table, true)
            .expect("definition should render"),
    );
    assert_eq!(
        sql,
        "CREATE TEMPORARY TABLE `app`.`events` (\
         `id` BIGINT UNSIGNED NOT NULL AUTO_INCREMENT COMMENT 'Event id', \
         `updated_at` TIMESTAMP NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP, \
         `note` TEXT NULL, \
         `price` DECIMAL(12,4) NOT NULL DEFAULT 0.000000, \
         PRIMARY KEY (`id`), FULLTEXT INDEX `FTI_EVENTS_NOTE` (`note`)) \
         ENGINE=MyISAM DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin COMMENT='It\\'s logged'"
    );
}

#[test]
fn identity_has_to_lead_the_primary_key() {
    let table = TableDefinition::new("pairs")
        .set_comment("Pairs")
        .add_column(ColumnDefinition::new("other", ColumnType::Integer).primary(1))
        .add_column(ColumnDefinition::new("id", ColumnType::Integer).identity().primary(2));
    let error = MysqlDialect
        .create_table(&table, false)
        .expect_err("trailing identity should be rejected");
    assert!(matches!(
        error,
        Error::Config(ConfigError::IdentityRequiresSinglePrimaryKey { ref column, dialect })
            if column == "id" && dialect == "mysql"
    ));
}

#[test]
fn column_changes_are_single_statements() {
    assert_eq!(
        alter(AlterOp::AddColumn(
            ColumnDefinition::new("note", ColumnType::Varchar).length(64)
        )),
        "ALTER TABLE `t` ADD COLUMN `note` VARCHAR(64) NULL"
    );
    assert_eq!(
        alter(AlterOp::DropColumn("qty".to_string())),
        "ALTER TABLE `t` DROP COLUMN `qty`"
    );
    assert_eq!(
        alter(AlterOp::ModifyColumn(
            ColumnDefinition::new("qty", ColumnType::BigInt).comment("On hand")
        )),
        "ALTER TABLE `t` MODIFY COLUMN `qty` BIGINT NULL COMMENT 'On hand'"
    );
    assert_eq!(
        alter(AlterOp::ChangeColumn {
            from: "sku".to_string(),
            column: ColumnDefinition::new("code", ColumnType::Varchar)
                .length(40)
                .not_null(),
        }),
        "ALTER TABLE `t` CHANGE COLUMN `sku` `code` VARCHAR(40) NOT NULL"
    );
}

#[test]
fn primary_key_columns_stay_not_null_when_modified() {
    assert_eq!(
        alter(AlterOp::ModifyColumn(ColumnDefinition::new(
            "id",
            ColumnType::BigInt
        ))),
        "ALTER TABLE `t` MODIFY COLUMN `id` BIGINT NOT NULL"
    );
}

#[test]
fn index_and_foreign_key_changes() {
    assert_eq!(
        alter(AlterOp::AddIndex(IndexDefinition {
            name: "T_SKU_PREFIX".to_string(),
            index_type: IndexType::Index,
            columns: vec![IndexColumn::new("sku").prefix(8)],
        })),
        "ALTER TABLE `t` ADD INDEX `T_SKU_PREFIX` (`sku`(8))"
    );
    assert_eq!(
        alter(AlterOp::AddIndex(IndexDefinition::new(
            "PRIMARY",
            IndexType::Primary,
            ["id", "sku"]
        ))),
        "ALTER TABLE `t` ADD PRIMARY KEY (`id`, `sku`)"
    );
    assert_eq!(
        alter(AlterOp::DropIndex("PRIMARY".to_string())),
        "ALTER TABLE `t` DROP PRIMARY KEY"
    );
    assert_eq!(
        alter(AlterOp::DropIndex("T_SKU".to_string())),
        "ALTER TABLE `t` DROP INDEX `T_SKU`"
    );
    assert_eq!(
        alter(AlterOp::AddForeignKey(
            ForeignKeyDefinition::new("", "qty", "shop.qty_levels", "level")
                .on_delete(ForeignKeyAction::SetNull)
        )),
        "ALTER TABLE `t` ADD CONSTRAINT `T_QTY_QTY_LEVELS_LEVEL` FOREIGN KEY (`qty`) \
         REFERENCES `shop`.`qty_levels` (`level`) ON DELETE SET NULL ON UPDATE NO ACTION"
    );
    assert_eq!(
        alter(AlterOp::DropForeignKey("T_QTY_QTY_LEVELS_LEVEL".to_string())),
        "ALTER TABLE `t` DROP FOREIGN KEY `T_QTY_QTY_LEVELS_LEVEL`"
    );
}

#[test]
fn table_level_changes() {
    assert_eq!(
        alter(AlterOp::SetComment("Renamed".to_string())),
        "ALTER TABLE `t` COMMENT = 'Renamed'"
    );
    assert_eq!(alter(AlterOp::Truncate), "TRUNCATE TABLE `t`");
    assert_eq!(
        alter(AlterOp::Rename(TableName::new("stock"))),
        "RENAME TABLE `t` TO `stock`"
    );
}

#[test]
fn temporary_tables_drop_with_the_temporary_keyword() {
    let statements = MysqlDialect.drop_table(&TableName::new("t"), true);
    assert_eq!(statements[0].sql, "DROP TEMPORARY TABLE IF EXISTS `t`");
}
