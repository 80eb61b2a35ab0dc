use super::dataset::Variation;

pub const FACE_PROMPT: &str = "Generate a photorealistic 85mm f/1.4 RAW portrait of this exact person.
Keep the same identity, same hair, same facial proportions. Apply soft studio lighting,
clean gradient background, high micro-detail with real skin texture and pores.
Preserve facial structure accurately. Professional headshot quality.

CRITICAL: The output image must look EXACTLY like this person - same face, same features.
Generate a new high-quality portrait image.";

/// Used to find a dataset model that can produce images at all; its output
/// doubles as the first variation.
pub const DATASET_PROBE_PROMPT: &str = "Generate a photorealistic portrait of this EXACT person. Professional headshot.
IDENTITY: Must look EXACTLY like the reference - same face, same features.
Generate a new high-quality portrait image.";

pub const UPSCALE_PROMPT: &str = "Enhance this image to maximum quality:

REQUIREMENTS:
- Increase resolution and sharpness to 4K quality
- Enhance skin texture with realistic detail (pores, micro-texture)
- Improve lighting and contrast
- Sharpen facial features, especially eyes
- Remove any compression artifacts or noise
- Maintain EXACT same identity and expression
- Do NOT change the person's appearance

OUTPUT: Generate a highest possible resolution, professional photography quality version of this image.";

pub fn dataset_prompt(variation: &Variation) -> String {
    format!(
        "Generate a photorealistic portrait of this EXACT person with these specifications:

IDENTITY: Must look EXACTLY like the reference - same face, same features, same identity.

SCENE: {}

TECHNICAL: 85mm lens look, RAW quality, natural skin texture, high detail.

Generate a new image maintaining perfect identity match.",
        variation.scene
    )
}
