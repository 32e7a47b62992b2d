//! Per-session workflow: generate an outfit, fetch recommendations for its
//! components, and chat with the stylist at any point.
//!
//! Every method here is a plain state transition over [`Session`]. Calls to
//! the generator and recommender happen between `begin_*`/`complete_*` pairs
//! in the HTTP layer so that no lock is held while they run.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    audit::{ActionKind, AuditEvent},
    catalog::RecommendationSet,
    error::{GenerationError, StylistError},
    models::{Components, Message, Occasion, OutfitView, Product, Role, SessionView, StylePreference},
    stylist::{GeneratedLook, OutfitRequest},
};

pub const OPENING_GREETING: &str =
    "Hello! I'm MYNA, your personal AI stylist. Let's design your outfit. First, upload your photo!";
pub const GENERIC_REPLY: &str =
    "Hello! I'm MYNA, your personal AI stylist. Please upload your photo to start designing your dream outfit!";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Empty,
    Generating,
    Generated,
    RecommendationsReady,
}

#[derive(Debug, Clone)]
pub struct Outfit {
    pub id: String,
    pub source_image: Bytes,
    pub style: StylePreference,
    pub occasion: Occasion,
    pub look: GeneratedLook,
}

impl Outfit {
    pub fn view(&self) -> OutfitView {
        OutfitView {
            outfit_id: self.id.clone(),
            style: self.style,
            occasion: self.occasion,
            components: self.look.components.clone(),
            source_image_bytes: self.source_image.len(),
            generated_image_base64: self.look.image.clone(),
        }
    }
}

/// Append-only conversation log.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    messages: Vec<Message>,
}

impl ChatHistory {
    fn greeting(now: DateTime<Utc>) -> Self {
        Self { messages: vec![Message { role: Role::Assistant, content: OPENING_GREETING.to_string(), timestamp: now }] }
    }

    fn push(&mut self, role: Role, content: String, now: DateTime<Utc>) -> &Message {
        self.messages.push(Message { role, content, timestamp: now });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    stage: Stage,
    outfit: Option<Outfit>,
    recommendations: Option<RecommendationSet>,
    last_outfit_id: Option<String>,
    chat: ChatHistory,
    chat_turns: usize,
    cart: Vec<Product>,
}

impl Session {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_id(timestamp_id("user", now, None), now)
    }

    pub fn with_id(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            stage: Stage::Empty,
            outfit: None,
            recommendations: None,
            last_outfit_id: None,
            chat: ChatHistory::greeting(now),
            chat_turns: 0,
            cart: Vec::new(),
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn stage(&self) -> Stage { self.stage }
    pub fn outfit(&self) -> Option<&Outfit> { self.outfit.as_ref() }
    pub fn recommendations(&self) -> Option<&RecommendationSet> { self.recommendations.as_ref() }
    pub fn history(&self) -> &ChatHistory { &self.chat }
    pub fn cart(&self) -> &[Product] { &self.cart }

    /// Chat is an overlay on top of the generation stages rather than a stage of its own.
    pub fn is_chatting(&self) -> bool {
        self.chat_turns > 0
    }

    pub fn components(&self) -> Option<&Components> {
        self.outfit.as_ref().map(|o| &o.look.components).filter(|c| !c.is_empty())
    }

    pub fn begin_generation(
        &mut self,
        image: Option<Bytes>,
        style: StylePreference,
        occasion: Occasion,
    ) -> Result<OutfitRequest, StylistError> {
        let image = image.filter(|b| !b.is_empty()).ok_or(StylistError::MissingInput("Please upload a photo first to generate the outfit."))?;
        if self.stage == Stage::Generating {
            return Err(StylistError::Busy);
        }
        self.stage = Stage::Generating;
        Ok(OutfitRequest { image, style, occasion })
    }

    /// Settles an in-flight generation. Exactly one audit event is returned,
    /// alongside the error when generation failed.
    pub fn complete_generation(
        &mut self,
        request: OutfitRequest,
        result: Result<GeneratedLook, GenerationError>,
        now: DateTime<Utc>,
    ) -> (AuditEvent, Result<&Outfit, StylistError>) {
        self.recommendations = None;
        match result {
            Ok(look) => {
                let id = timestamp_id("outfit", now, self.last_outfit_id.as_deref());
                self.last_outfit_id = Some(id.clone());
                let event = AuditEvent::new(
                    &self.id,
                    Some(&id),
                    ActionKind::Generated,
                    json!({ "style": request.style, "occasion": request.occasion, "components": look.components }),
                );
                self.stage = Stage::Generated;
                let outfit: &Outfit = self.outfit.insert(Outfit {
                    id,
                    source_image: request.image,
                    style: request.style,
                    occasion: request.occasion,
                    look,
                });
                (event, Ok(outfit))
            }
            Err(e) => {
                self.outfit = None;
                self.stage = Stage::Empty;
                let event = AuditEvent::new(
                    &self.id,
                    None,
                    ActionKind::GenerationFailed,
                    json!({ "style": request.style, "occasion": request.occasion, "error": e.to_string() }),
                );
                (event, Err(e.into()))
            }
        }
    }

    /// Components and outfit id to query recommendations for.
    pub fn recommendation_query(&self) -> Result<(String, Components), StylistError> {
        match (&self.outfit, self.components()) {
            (Some(outfit), Some(components)) if self.stage != Stage::Generating => {
                Ok((outfit.id.clone(), components.clone()))
            }
            _ => Err(StylistError::NoOutfitComponents),
        }
    }

    pub fn install_recommendations(
        &mut self,
        outfit_id: &str,
        set: RecommendationSet,
    ) -> Result<(AuditEvent, &RecommendationSet), StylistError> {
        if self.stage == Stage::Generating || self.outfit.as_ref().map(|o| o.id.as_str()) != Some(outfit_id) {
            return Err(StylistError::StaleOutfit(outfit_id.to_string()));
        }
        let event = AuditEvent::new(&self.id, Some(outfit_id), ActionKind::Recommended, json!({ "keys": set.keys().collect::<Vec<_>>() }));
        self.stage = Stage::RecommendationsReady;
        let set: &RecommendationSet = self.recommendations.insert(set);
        Ok((event, set))
    }

    pub fn add_to_cart(&mut self, component: &str, link: &str) -> Result<(AuditEvent, &Product), StylistError> {
        let product = self
            .recommendations
            .as_ref()
            .and_then(|set| set.find(component, link))
            .cloned()
            .ok_or_else(|| StylistError::ProductNotFound { component: component.to_string(), link: link.to_string() })?;
        let details = serde_json::to_value(&product).unwrap_or_default();
        let event = AuditEvent::new(&self.id, self.outfit.as_ref().map(|o| o.id.as_str()), ActionKind::AddToCart, details);
        self.cart.push(product);
        Ok((event, &self.cart[self.cart.len() - 1]))
    }

    pub fn chat(&mut self, prompt: &str, now: DateTime<Utc>) -> Result<(AuditEvent, &Message), StylistError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StylistError::MissingInput("Ask MYNA something to start the conversation."));
        }
        let response = compose_reply(self.components(), prompt);
        let event = AuditEvent::new(
            &self.id,
            self.outfit.as_ref().map(|o| o.id.as_str()),
            ActionKind::ChatInteraction,
            json!({ "prompt": prompt, "response": response }),
        );
        self.chat.push(Role::User, prompt.to_string(), now);
        self.chat_turns += 1;
        let reply = self.chat.push(Role::Assistant, response, now);
        Ok((event, reply))
    }

    pub fn view(&self, upsell: &str) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            stage: self.stage,
            chatting: self.is_chatting(),
            outfit: self.outfit.as_ref().map(Outfit::view),
            recommendations: match (&self.outfit, &self.recommendations) {
                (Some(outfit), Some(set)) => Some(set.view(&outfit.id, upsell)),
                _ => None,
            },
            cart: self.cart.clone(),
            messages: self.chat.messages().to_vec(),
            created_at: self.created_at,
        }
    }
}

/// Stylist reply for a chat turn. Depends only on the detected components
/// and the prompt, so identical inputs always give identical replies.
pub fn compose_reply(components: Option<&Components>, _prompt: &str) -> String {
    match components {
        Some(components) if !components.is_empty() => {
            let labels: Vec<&str> = components.values().map(String::as_str).collect();
            format!(
                "I see you're working with an outfit that includes a **{}**. How can I help you re-style it, or would you like to explore alternatives for the **{}**?",
                labels.join(", "),
                labels[0]
            )
        }
        _ => GENERIC_REPLY.to_string(),
    }
}

/// `<prefix>-<unix millis>`, bumped past `previous` so ids from the same
/// clock tick still differ.
pub fn timestamp_id(prefix: &str, now: DateTime<Utc>, previous: Option<&str>) -> String {
    let mut millis = now.timestamp_millis();
    if let Some(prev) = previous
        .and_then(|p| p.strip_prefix(prefix))
        .and_then(|p| p.strip_prefix('-'))
        .and_then(|p| p.parse::<i64>().ok())
    {
        if millis <= prev {
            millis = prev + 1;
        }
    }
    format!("{prefix}-{millis}")
}
