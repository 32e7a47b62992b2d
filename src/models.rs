use std::{collections::BTreeMap, fmt};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::{audit::AuditEvent, workflow::Stage};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum StylePreference {
    #[default]
    #[serde(rename = "Nano-Banana Styling 🍌")]
    NanoBanana,
    #[serde(rename = "Casual Chic")]
    CasualChic,
    #[serde(rename = "Formal Wear")]
    FormalWear,
    #[serde(rename = "Party Look")]
    PartyLook,
}

impl fmt::Display for StylePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NanoBanana => "Nano-Banana Styling 🍌",
            Self::CasualChic => "Casual Chic",
            Self::FormalWear => "Formal Wear",
            Self::PartyLook => "Party Look",
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occasion {
    #[default]
    Everyday,
    #[serde(rename = "Office/Work")]
    OfficeWork,
    #[serde(rename = "Wedding/Party")]
    WeddingParty,
    Vacation,
}

impl fmt::Display for Occasion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Everyday => "Everyday",
            Self::OfficeWork => "Office/Work",
            Self::WeddingParty => "Wedding/Party",
            Self::Vacation => "Vacation",
        })
    }
}

/// Garment category detected on a generated outfit. Ordering follows the
/// order components are presented in: top, bottom, accessory.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ComponentSlot {
    Top,
    Bottom,
    Accessory,
}

impl ComponentSlot {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Top => "Top",
            Self::Bottom => "Bottom",
            Self::Accessory => "Accessory",
        }
    }
}

pub type Components = BTreeMap<ComponentSlot, String>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub price: u32,
    pub link: String,
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GenerateRequest {
    #[serde_as(as = "Option<Base64>")]
    pub image_base64: Option<Bytes>,
    #[serde(default)]
    pub style: StylePreference,
    #[serde(default)]
    pub occasion: Occasion,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AddToCartRequest {
    /// Display key of the recommendation group, e.g. "Kurti (Top)".
    pub component: String,
    pub link: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub prompt: String,
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutfitView {
    pub outfit_id: String,
    pub style: StylePreference,
    pub occasion: Occasion,
    pub components: Components,
    pub source_image_bytes: usize,
    #[serde_as(as = "Base64")]
    pub generated_image_base64: Bytes,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecommendationGroupView {
    pub key: String,
    pub slot: ComponentSlot,
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecommendationsView {
    pub outfit_id: String,
    pub recommendations: Vec<RecommendationGroupView>,
    pub upsell: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CartView {
    pub added: Product,
    pub cart: Vec<Product>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatView {
    pub reply: Message,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionView {
    pub session_id: String,
    pub stage: Stage,
    pub chatting: bool,
    pub outfit: Option<OutfitView>,
    pub recommendations: Option<RecommendationsView>,
    pub cart: Vec<Product>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EventsView {
    pub session_id: String,
    pub events: Vec<AuditEvent>,
}
