// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Model Routing
//!
//! Resolves a requested model identifier to a provider, a canonical
//! model id, and a generation family. Known aliases (marketing names
//! for one underlying engine) are resolved by pure table lookup only,
//! so the price table stays consistent with routing. Unmapped ids fall
//! back deterministically by family inference.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::provider::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    TextToImage,
    ImageToImage,
    Video,
    Audio,
}

impl ModelFamily {
    pub fn is_video(&self) -> bool {
        matches!(self, ModelFamily::Video)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRoute {
    pub provider: ProviderKind,
    pub canonical_model: String,
    pub family: ModelFamily,
    /// Edit-style models need at least one reference image. The check
    /// itself happens at submission, where reference files are final.
    pub requires_reference_image: bool,
}

/// Identifier substrings that mark a model as video-class. Any unmapped
/// id containing one of these routes to the video family, never image
/// or audio.
const VIDEO_HINTS: &[&str] = &["video", "veo", "kling", "sora", "runway", "wan", "hailuo"];

const AUDIO_HINTS: &[&str] = &["audio", "music", "suno", "speech", "tts"];

/// Pure alias/route table plus deterministic fallback inference.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, ModelRoute>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// The routes every deployment starts from; config entries may add
    /// to or override them.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        let entries: &[(&str, ProviderKind, &str, ModelFamily, bool)] = &[
            ("flux-dev", ProviderKind::Fal, "fal-ai/flux/dev", ModelFamily::TextToImage, false),
            ("flux-pro", ProviderKind::Fal, "fal-ai/flux-pro/v1.1", ModelFamily::TextToImage, false),
            // Marketing alias for the same engine as flux-pro.
            ("flux-ultra", ProviderKind::Fal, "fal-ai/flux-pro/v1.1-ultra", ModelFamily::TextToImage, false),
            ("flux-kontext", ProviderKind::Fal, "fal-ai/flux-pro/kontext", ModelFamily::ImageToImage, true),
            ("kling-video", ProviderKind::Fal, "fal-ai/kling-video/v2/master", ModelFamily::Video, false),
            ("veo3", ProviderKind::Fal, "fal-ai/veo3", ModelFamily::Video, false),
            ("sdxl", ProviderKind::Replicate, "stability-ai/sdxl", ModelFamily::TextToImage, false),
            ("wan-video", ProviderKind::Replicate, "wan-video/wan-2.2-t2v-fast", ModelFamily::Video, false),
            ("musicgen", ProviderKind::Replicate, "meta/musicgen", ModelFamily::Audio, false),
        ];
        for (alias, provider, canonical, family, needs_ref) in entries {
            table.insert(alias, ModelRoute {
                provider: *provider,
                canonical_model: (*canonical).to_string(),
                family: *family,
                requires_reference_image: *needs_ref,
            });
        }
        table
    }

    pub fn insert(&mut self, alias: &str, route: ModelRoute) {
        self.routes.insert(alias.to_ascii_lowercase(), route);
    }

    /// Resolve a model identifier to a route.
    ///
    /// Mapped ids resolve by lookup only and are never inferred. Unmapped ids
    /// fall back by family: video-hinted ids go to the video family;
    /// audio-hinted ids to audio; reference images route to the
    /// image-conditioned variant; otherwise text-conditioned.
    pub fn resolve(
        &self,
        model_id: &str,
        has_reference_images: bool,
        has_reference_video: bool,
    ) -> ModelRoute {
        let key = model_id.to_ascii_lowercase();
        if let Some(route) = self.routes.get(&key) {
            return route.clone();
        }

        let family = infer_family(&key, has_reference_images, has_reference_video);
        let (provider, canonical) = match family {
            ModelFamily::Video => (ProviderKind::Fal, "fal-ai/kling-video/v2/master"),
            ModelFamily::Audio => (ProviderKind::Replicate, "meta/musicgen"),
            ModelFamily::ImageToImage => (ProviderKind::Fal, "fal-ai/flux-pro/kontext"),
            ModelFamily::TextToImage => (ProviderKind::Fal, "fal-ai/flux/dev"),
        };
        ModelRoute {
            provider,
            canonical_model: canonical.to_string(),
            family,
            requires_reference_image: matches!(family, ModelFamily::ImageToImage),
        }
    }
}

fn infer_family(model_id: &str, has_reference_images: bool, has_reference_video: bool) -> ModelFamily {
    if has_reference_video || VIDEO_HINTS.iter().any(|h| model_id.contains(h)) {
        return ModelFamily::Video;
    }
    if AUDIO_HINTS.iter().any(|h| model_id.contains(h)) {
        return ModelFamily::Audio;
    }
    if has_reference_images {
        return ModelFamily::ImageToImage;
    }
    ModelFamily::TextToImage
}
