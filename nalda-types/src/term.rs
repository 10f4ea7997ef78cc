use crate::product::Product;
use async_trait::async_trait;
use std::collections::HashMap;
use typesafe_repository::async_ops::{Get, List, Save};
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;

pub const PATH_SEPARATOR: &str = " > ";

/// A taxonomy term (category, brand, ...) with an optional parent.
#[derive(Id, Clone, Debug)]
pub struct Term {
    #[id]
    pub id: i64,
    pub taxonomy: String,
    pub name: String,
    pub parent_id: Option<IdentityOf<Term>>,
}

/// All terms of the catalog loaded once per export run, so that parent-chain
/// walks stay pure lookups.
#[derive(Debug, Default)]
pub struct TermIndex {
    terms: HashMap<IdentityOf<Term>, Term>,
}

impl TermIndex {
    pub fn new(terms: Vec<Term>) -> Self {
        Self {
            terms: terms.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    pub fn get(&self, id: IdentityOf<Term>) -> Option<&Term> {
        self.terms.get(&id)
    }

    /// The product's assigned terms of one taxonomy, in assignment order.
    pub fn terms_of<'a>(&'a self, product: &Product, taxonomy: &str) -> Vec<&'a Term> {
        product
            .term_ids
            .iter()
            .filter_map(|id| self.terms.get(id))
            .filter(|t| t.taxonomy == taxonomy)
            .collect()
    }

    /// Full ancestor path of a term, root first.
    pub fn chain<'a>(&'a self, leaf: &'a Term) -> TermChain<'a> {
        let mut terms = vec![leaf];
        while let Some(id) = terms.last().and_then(|t| t.parent_id) {
            if terms.iter().any(|t| t.id == id) {
                break;
            }
            match self.terms.get(&id) {
                Some(parent) => terms.push(parent),
                None => break,
            }
        }
        terms.reverse();
        TermChain { terms }
    }
}

pub struct TermChain<'a> {
    terms: Vec<&'a Term>,
}

impl TermChain<'_> {
    pub fn path(&self) -> String {
        itertools::intersperse(self.terms.iter().map(|t| t.name.as_str()), PATH_SEPARATOR)
            .collect()
    }
}

#[async_trait]
pub trait TermRepository:
    Repository<Term, Error = anyhow::Error> + Save<Term> + Get<Term> + List<Term> + Send + Sync
{
    async fn load_index(&self) -> Result<TermIndex, Self::Error> {
        Ok(TermIndex::new(self.list().await?))
    }
}
