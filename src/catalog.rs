use async_trait::async_trait;
use nalda_types::product::{CatalogRepository, Product, ProductKind, VariationsOf};
use nalda_types::term::{Term, TermRepository};
use rusqlite::types::Type;
use rusqlite::params;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Get, List, Save, Select};
use typesafe_repository::prelude::*;

pub struct SqliteCatalogRepository {
    conn: Connection,
}

const SELECT_PRODUCT: &str = "SELECT id, parent_id, kind, published, name, sku, price, stock, \
     in_stock, description, short_description, image, gallery, length, width, height, \
     dimension_unit, weight, weight_unit, meta, attributes, term_ids FROM product";

impl SqliteCatalogRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS product (
                    id INTEGER PRIMARY KEY,
                    parent_id INTEGER,
                    kind TEXT NOT NULL,
                    published INTEGER NOT NULL DEFAULT 1,
                    name TEXT NOT NULL DEFAULT '',
                    sku TEXT NOT NULL DEFAULT '',
                    price TEXT,
                    stock INTEGER,
                    in_stock INTEGER NOT NULL DEFAULT 1,
                    description TEXT NOT NULL DEFAULT '',
                    short_description TEXT NOT NULL DEFAULT '',
                    image TEXT,
                    gallery TEXT NOT NULL DEFAULT '',
                    length TEXT,
                    width TEXT,
                    height TEXT,
                    dimension_unit TEXT NOT NULL DEFAULT 'cm',
                    weight TEXT,
                    weight_unit TEXT NOT NULL DEFAULT 'kg',
                    meta TEXT,
                    attributes TEXT,
                    term_ids TEXT NOT NULL DEFAULT ''
                )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

fn decimal_from_db(raw: Option<String>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    raw.as_deref()
        .filter(|s| !s.is_empty())
        .map(Decimal::from_str)
        .transpose()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into()))
}

fn list_from_db(raw: String) -> Vec<String> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn list_to_db(values: &[String]) -> String {
    values.join(",")
}

fn ids_from_db(raw: String, idx: usize) -> rusqlite::Result<Vec<i64>> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
            })
        })
        .collect()
}

fn ids_to_db(ids: &[i64]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn map_to_db(map: &HashMap<String, String>) -> Option<String> {
    if map.is_empty() {
        None
    } else {
        serde_json::to_string(map).ok()
    }
}

fn map_from_db(raw: Option<String>) -> HashMap<String, String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn map_product(row: &rusqlite::Row) -> rusqlite::Result<Product> {
    let kind = ProductKind::from_str(&row.get::<_, String>(2)?)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, err.into()))?;
    Ok(Product {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        kind,
        published: row.get(3)?,
        name: row.get(4)?,
        sku: row.get(5)?,
        price: decimal_from_db(row.get(6)?, 6)?,
        stock: row.get(7)?,
        in_stock: row.get(8)?,
        description: row.get(9)?,
        short_description: row.get(10)?,
        image: row.get(11)?,
        gallery: list_from_db(row.get(12)?),
        length: decimal_from_db(row.get(13)?, 13)?,
        width: decimal_from_db(row.get(14)?, 14)?,
        height: decimal_from_db(row.get(15)?, 15)?,
        dimension_unit: row.get(16)?,
        weight: decimal_from_db(row.get(17)?, 17)?,
        weight_unit: row.get(18)?,
        meta: map_from_db(row.get(19)?),
        attributes: map_from_db(row.get(20)?),
        term_ids: ids_from_db(row.get(21)?, 21)?,
    })
}

impl Repository<Product> for SqliteCatalogRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Get<Product> for SqliteCatalogRepository {
    async fn get_one(&self, id: &IdentityOf<Product>) -> Result<Option<Product>, Self::Error> {
        let id = *id;
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("{SELECT_PRODUCT} WHERE id = ?1"))?;
                let p = stmt
                    .query_map([id], map_product)?
                    .next()
                    .transpose()?;
                Ok(p)
            })
            .await?)
    }
}

#[async_trait]
impl List<Product> for SqliteCatalogRepository {
    async fn list(&self) -> Result<Vec<Product>, Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("{SELECT_PRODUCT} ORDER BY id"))?;
                let p = stmt
                    .query_map([], map_product)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(p)
            })
            .await?)
    }
}

#[async_trait]
impl Select<Product, VariationsOf> for SqliteCatalogRepository {
    async fn select(
        &self,
        VariationsOf(parent_id): &VariationsOf,
    ) -> Result<Vec<Product>, Self::Error> {
        let parent_id = *parent_id;
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_PRODUCT} WHERE parent_id = ?1 AND kind = 'variation' ORDER BY id"
                ))?;
                let p = stmt
                    .query_map([parent_id], map_product)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(p)
            })
            .await?)
    }
}

#[async_trait]
impl Save<Product> for SqliteCatalogRepository {
    async fn save(&self, p: Product) -> Result<(), Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO product (id, parent_id, kind, published, name, sku, price, \
                     stock, in_stock, description, short_description, image, gallery, length, \
                     width, height, dimension_unit, weight, weight_unit, meta, attributes, \
                     term_ids) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, \
                     ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22) ON CONFLICT(id) DO UPDATE SET \
                     parent_id=?2, kind=?3, published=?4, name=?5, sku=?6, price=?7, stock=?8, \
                     in_stock=?9, description=?10, short_description=?11, image=?12, gallery=?13, \
                     length=?14, width=?15, height=?16, dimension_unit=?17, weight=?18, \
                     weight_unit=?19, meta=?20, attributes=?21, term_ids=?22",
                    params![
                        p.id,
                        p.parent_id,
                        p.kind.as_str(),
                        p.published,
                        p.name,
                        p.sku,
                        p.price.map(|d| d.to_string()),
                        p.stock,
                        p.in_stock,
                        p.description,
                        p.short_description,
                        p.image,
                        list_to_db(&p.gallery),
                        p.length.map(|d| d.to_string()),
                        p.width.map(|d| d.to_string()),
                        p.height.map(|d| d.to_string()),
                        p.dimension_unit,
                        p.weight.map(|d| d.to_string()),
                        p.weight_unit,
                        map_to_db(&p.meta),
                        map_to_db(&p.attributes),
                        ids_to_db(&p.term_ids),
                    ],
                )?;
                Ok(())
            })
            .await?)
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn published_ids(&self) -> Result<Vec<IdentityOf<Product>>, Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id FROM product WHERE published = 1 AND kind IN ('simple', 'variable') ORDER BY id",
                )?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ids)
            })
            .await?)
    }
}

pub struct SqliteTermRepository {
    conn: Connection,
}

impl SqliteTermRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS term (
                    id INTEGER PRIMARY KEY,
                    taxonomy TEXT NOT NULL,
                    name TEXT NOT NULL,
                    parent_id INTEGER
                )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

fn map_term(row: &rusqlite::Row) -> rusqlite::Result<Term> {
    Ok(Term {
        id: row.get(0)?,
        taxonomy: row.get(1)?,
        name: row.get(2)?,
        parent_id: row.get(3)?,
    })
}

impl Repository<Term> for SqliteTermRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Get<Term> for SqliteTermRepository {
    async fn get_one(&self, id: &IdentityOf<Term>) -> Result<Option<Term>, Self::Error> {
        let id = *id;
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id, taxonomy, name, parent_id FROM term WHERE id = ?1")?;
                let t = stmt.query_map([id], map_term)?.next().transpose()?;
                Ok(t)
            })
            .await?)
    }
}

#[async_trait]
impl List<Term> for SqliteTermRepository {
    async fn list(&self) -> Result<Vec<Term>, Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id, taxonomy, name, parent_id FROM term ORDER BY id")?;
                let t = stmt
                    .query_map([], map_term)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(t)
            })
            .await?)
    }
}

#[async_trait]
impl Save<Term> for SqliteTermRepository {
    async fn save(&self, t: Term) -> Result<(), Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO term (id, taxonomy, name, parent_id) VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(id) DO UPDATE SET taxonomy=?2, name=?3, parent_id=?4",
                    params![t.id, t.taxonomy, t.name, t.parent_id],
                )?;
                Ok(())
            })
            .await?)
    }
}

impl TermRepository for SqliteTermRepository {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::fields::tests::product;
    use rust_decimal_macros::dec;

    async fn repository() -> SqliteCatalogRepository {
        let conn = Connection::open_in_memory().await.unwrap();
        SqliteCatalogRepository::init(conn).await.unwrap()
    }

    #[actix_rt::test]
    async fn products_round_trip() {
        let repo = repository().await;
        let mut p = product(1);
        p.price = Some(dec!(12.50));
        p.gallery = vec!["a.jpg".to_string(), "b.jpg".to_string()];
        p.meta.insert("_ean".to_string(), "123".to_string());
        p.term_ids = vec![3, 5];
        repo.save(p).await.unwrap();

        let loaded = repo.get_one(&1).await.unwrap().unwrap();
        assert_eq!(Some(dec!(12.50)), loaded.price);
        assert_eq!(vec!["a.jpg", "b.jpg"], loaded.gallery);
        assert_eq!(Some(&"123".to_string()), loaded.meta.get("_ean"));
        assert_eq!(vec![3, 5], loaded.term_ids);
    }

    #[actix_rt::test]
    async fn published_ids_skip_variations_and_drafts() {
        let repo = repository().await;
        let mut simple = product(1);
        simple.kind = ProductKind::Simple;
        let mut variable = product(2);
        variable.kind = ProductKind::Variable;
        let mut variation = product(3);
        variation.kind = ProductKind::Variation;
        variation.parent_id = Some(2);
        let mut draft = product(4);
        draft.published = false;
        for p in [simple, variable, variation, draft] {
            repo.save(p).await.unwrap();
        }

        assert_eq!(vec![1, 2], repo.published_ids().await.unwrap());
        let variations = repo.select(&VariationsOf(2)).await.unwrap();
        assert_eq!(1, variations.len());
        assert_eq!(3, variations[0].id);
    }
}
