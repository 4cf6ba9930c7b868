use md5::{Digest, Md5};

use crate::IndexType;

/// What kind of object a generated identifier names; selects the hash prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Table,
    Index(IndexType),
    ForeignKey,
    Trigger,
}

impl NameKind {
    const fn prefixes(self) -> (&'static str, &'static str) {
        match self {
            Self::Table => ("t_", "t_"),
            Self::Index(IndexType::Index) => ("idx_", "i_"),
            Self::Index(IndexType::Unique) => ("unq_", "u_"),
            Self::Index(IndexType::Fulltext) => ("fti_", "f_"),
            Self::Index(IndexType::Primary) => ("pk_", "p_"),
            Self::ForeignKey => ("fk_", "f_"),
            Self::Trigger => ("trg_", "g_"),
        }
    }
}

/// Hex digits of the full name's hash appended to the initials form.
const INITIALS_TAG_LEN: usize = 8;

/// Fits `full` into `limit` bytes. Names that already fit are returned as is,
/// so the function is idempotent; everything else is derived from `full`
/// alone, so the same logical name always maps to the same identifier.
/// Different names sharing their initials keep distinct identifiers.
#[must_use]
pub fn shorten_name(kind: NameKind, full: &str, limit: usize) -> String {
    if full.len() <= limit {
        return full.to_string();
    }

    let (prefix, short_prefix) = kind.prefixes();
    let hash = hex::encode(Md5::digest(full.as_bytes()));
    let initials = initials(full);
    if !initials.is_empty() {
        let tagged = format!("{prefix}{initials}_{}", &hash[..INITIALS_TAG_LEN]);
        if tagged.len() <= limit {
            return tagged;
        }
    }

    if prefix.len() + hash.len() <= limit {
        return format!("{prefix}{hash}");
    }
    if short_prefix.len() + hash.len() <= limit {
        return format!("{short_prefix}{hash}");
    }
    if short_prefix.len() >= limit {
        return hash[..limit.min(hash.len())].to_string();
    }

    let excess = short_prefix.len() + hash.len() - limit;
    let left = excess / 2;
    let right = excess / 2 + excess % 2;
    let middle = hash.len() / 2;
    format!(
        "{short_prefix}{}{}",
        &hash[..middle - left],
        &hash[middle + right..]
    )
}

/// `customer_address_entity` becomes `CAE`; the hash tag follows it.
fn initials(full: &str) -> String {
    full.split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter_map(|word| word.chars().next())
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

/// Identifier builders that derive physical names from logical parts and keep
/// them under a dialect's identifier limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameBuilder {
    limit: usize,
}

impl NameBuilder {
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self { limit }
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn table_name(&self, name: &str) -> String {
        shorten_name(NameKind::Table, name, self.limit)
    }

    #[must_use]
    pub fn index_name<S: AsRef<str>>(
        &self,
        table: &str,
        columns: &[S],
        index_type: IndexType,
    ) -> String {
        let mut natural = table.to_string();
        for column in columns {
            natural.push('_');
            natural.push_str(column.as_ref());
        }
        shorten_name(
            NameKind::Index(index_type),
            &natural.to_ascii_uppercase(),
            self.limit,
        )
    }

    #[must_use]
    pub fn foreign_key_name(
        &self,
        table: &str,
        column: &str,
        ref_table: &str,
        ref_column: &str,
    ) -> String {
        let natural = format!("{table}_{column}_{ref_table}_{ref_column}").to_ascii_uppercase();
        shorten_name(NameKind::ForeignKey, &natural, self.limit)
    }

    #[must_use]
    pub fn primary_key_name(&self, table: &str) -> String {
        let natural = format!("{table}_pkey");
        shorten_name(NameKind::Index(IndexType::Primary), &natural, self.limit)
    }

    #[must_use]
    pub fn on_update_trigger_name(&self, table: &str, column: &str) -> String {
        let natural = format!("trg_{table}_{column}_on_update");
        shorten_name(NameKind::Trigger, &natural, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use md5::{Digest, Md5};

    use super::{NameBuilder, NameKind, shorten_name};
    use crate::IndexType;

    const LONG: &str = "very_long_constraint_name_that_exceeds_sixty_four_bytes_total_length";

    #[test]
    fn names_that_fit_are_untouched() {
        assert_eq!(
            shorten_name(NameKind::Table, "sales_order", 64),
            "sales_order"
        );
    }

    #[test]
    fn long_index_name_is_shortened_with_prefix() {
        let kind = NameKind::Index(IndexType::Index);
        let short = shorten_name(kind, LONG, 64);
        assert!(short.len() <= 64);
        let hash = hex::encode(Md5::digest(LONG.as_bytes()));
        assert_eq!(short, format!("idx_VLCNTESFBTL_{}", &hash[..8]));
        assert_eq!(shorten_name(kind, LONG, 64), short);
        assert_eq!(shorten_name(kind, &short, 64), short);
    }

    #[test]
    fn names_sharing_initials_stay_distinct() {
        let names = NameBuilder::new(64);
        let table = "customer_address_entity_varchar_values";
        let first = names.index_name(
            table,
            &["attribute_id", "store_id", "entity_id"],
            IndexType::Index,
        );
        let second = names.index_name(
            table,
            &["alias_idx", "sku_idxx", "extra_idxx"],
            IndexType::Index,
        );
        assert!(first.starts_with("idx_CAEVVAISIEI_"), "{first}");
        assert!(second.starts_with("idx_CAEVVAISIEI_"), "{second}");
        assert_ne!(first, second);
    }

    #[test]
    fn hash_fallback_when_initials_do_not_fit() {
        let kind = NameKind::ForeignKey;
        let short = shorten_name(kind, LONG, 12);
        assert_eq!(short.len(), 12);
        assert!(short.starts_with("f_"));
        let hash = hex::encode(Md5::digest(LONG.as_bytes()));
        assert!(hash.starts_with(&short[2..7]));
        assert!(hash.ends_with(&short[7..]));
    }

    #[test]
    fn prefix_and_full_hash_when_it_fits() {
        let long_words = "ab_".repeat(40);
        let short = shorten_name(NameKind::Index(IndexType::Unique), &long_words, 40);
        assert!(short.starts_with("unq_"));
        assert_eq!(short.len(), 36);
    }

    #[test]
    fn middle_trim_hits_limit_exactly_for_every_length() {
        for limit in 3..14 {
            let short = shorten_name(NameKind::ForeignKey, LONG, limit);
            assert_eq!(short.len(), limit, "limit {limit}");
            assert_eq!(shorten_name(NameKind::ForeignKey, &short, limit), short);
        }
    }

    #[test]
    fn builders_are_deterministic_and_bounded() {
        let names = NameBuilder::new(63);
        let index = names.index_name(
            "catalog_product_entity_varchar",
            &["attribute_id", "store_id", "entity_id"],
            IndexType::Unique,
        );
        assert!(index.len() <= 63);
        assert_eq!(
            index,
            names.index_name(
                "catalog_product_entity_varchar",
                &["attribute_id", "store_id", "entity_id"],
                IndexType::Unique,
            )
        );
        assert_eq!(
            names.foreign_key_name("order", "store_id", "store", "store_id"),
            "ORDER_STORE_ID_STORE_STORE_ID"
        );
    }
}
