use crate::term::Term;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use typesafe_repository::async_ops::{Get, List, Save, Select};
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;
use typesafe_repository::{SelectBy, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductKind {
    Simple,
    Variable,
    Variation,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Variable => "variable",
            Self::Variation => "variation",
        }
    }
}

impl std::str::FromStr for ProductKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Self::Simple),
            "variable" => Ok(Self::Variable),
            "variation" => Ok(Self::Variation),
            other => Err(anyhow::anyhow!("Unknown product kind {other:?}")),
        }
    }
}

/// One catalog entity. Simple and variable products are listed directly;
/// variations reference their parent and carry the selected attribute values.
#[derive(Id, Clone, Debug)]
pub struct Product {
    #[id]
    pub id: i64,
    pub parent_id: Option<IdentityOf<Product>>,
    pub kind: ProductKind,
    pub published: bool,
    pub name: String,
    pub sku: String,
    pub price: Option<Decimal>,
    pub stock: Option<i64>,
    pub in_stock: bool,
    pub description: String,
    pub short_description: String,
    pub image: Option<String>,
    pub gallery: Vec<String>,
    pub length: Option<Decimal>,
    pub width: Option<Decimal>,
    pub height: Option<Decimal>,
    pub dimension_unit: String,
    pub weight: Option<Decimal>,
    pub weight_unit: String,
    pub meta: HashMap<String, String>,
    pub attributes: HashMap<String, String>,
    pub term_ids: Vec<IdentityOf<Term>>,
}

impl Product {
    pub fn is_variation(&self) -> bool {
        self.kind == ProductKind::Variation
    }
}

pub struct VariationsOf(pub IdentityOf<Product>);

impl Selector for VariationsOf {}
impl SelectBy<VariationsOf> for Product {}

#[async_trait]
pub trait CatalogRepository:
    Repository<Product, Error = anyhow::Error>
    + Save<Product>
    + Get<Product>
    + List<Product>
    + Select<Product, VariationsOf>
    + Send
    + Sync
{
    /// Ids of published simple and variable products, in catalog order.
    async fn published_ids(&self) -> Result<Vec<IdentityOf<Product>>, Self::Error>;
}
