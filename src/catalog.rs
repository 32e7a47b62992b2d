use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use tracing::info;

use crate::models::{ComponentSlot, Components, Product, RecommendationGroupView, RecommendationsView};

pub const UPSELL_HINT: &str =
    "A matching belt and watch would complete this look! Find them in the Conversational Stylist tab.";

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationGroup {
    pub key: String,
    pub products: Vec<Product>,
}

/// Products for each detected component, in slot order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationSet {
    groups: BTreeMap<ComponentSlot, RecommendationGroup>,
}

impl RecommendationSet {
    pub fn insert(&mut self, slot: ComponentSlot, label: &str, products: Vec<Product>) {
        let key = display_key(slot, label);
        self.groups.insert(slot, RecommendationGroup { key, products });
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.values().map(|g| g.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&[Product]> {
        self.groups.values().find(|g| g.key == key).map(|g| g.products.as_slice())
    }

    pub fn find(&self, key: &str, link: &str) -> Option<&Product> {
        self.get(key)?.iter().find(|p| p.link == link)
    }

    pub fn view(&self, outfit_id: &str, upsell: &str) -> RecommendationsView {
        RecommendationsView {
            outfit_id: outfit_id.to_string(),
            recommendations: self
                .groups
                .iter()
                .map(|(slot, g)| RecommendationGroupView { key: g.key.clone(), slot: *slot, products: g.products.clone() })
                .collect(),
            upsell: upsell.to_string(),
        }
    }
}

pub fn display_key(slot: ComponentSlot, label: &str) -> String {
    format!("{} ({})", label, slot.title())
}

#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, components: &Components) -> RecommendationSet;
}

/// Fixed product table standing in for a catalog query.
pub struct StaticCatalog {
    delay: Duration,
    table: BTreeMap<&'static str, Vec<Product>>,
}

fn product(name: &str, price: u32, link: &str, image: &str) -> Product {
    Product { name: name.into(), price, link: link.into(), image: image.into() }
}

impl StaticCatalog {
    pub fn new(delay: Duration) -> Self {
        let mut table = BTreeMap::new();
        table.insert("Kurti", vec![
            product("Floral A-line Kurti", 1299, "#link1", "top_img.jpg"),
            product("Solid Mandarin Kurti", 999, "#link2", "top_img2.jpg"),
        ]);
        table.insert("Palazzo", vec![
            product("Silk Palazzo Trousers", 1450, "#link3", "bottom_img.jpg"),
        ]);
        table.insert("Tote Bag", vec![
            product("Leather Tote Bag", 2800, "#link4", "acc_img.jpg"),
            product("Woven Straw Tote", 1100, "#link5", "acc_img2.jpg"),
        ]);
        Self { delay, table }
    }

    pub fn lookup(&self, label: &str) -> Vec<Product> {
        self.table.get(label).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Recommender for StaticCatalog {
    async fn recommend(&self, components: &Components) -> RecommendationSet {
        info!("🛍️ Matching {} components to the catalog", components.len());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut set = RecommendationSet::default();
        for (slot, label) in components {
            let products = self.lookup(label);
            if products.is_empty() {
                info!("⚠️ No catalog entries for {}", display_key(*slot, label));
            }
            set.insert(*slot, label, products);
        }
        set
    }
}
