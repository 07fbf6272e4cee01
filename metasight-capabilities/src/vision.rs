use std::sync::Arc;

use metasight_agent::TypedCapability;
use metasight_core::{CapabilityContext, CapabilityError, ImageRef, InputRef, MetasightError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An opaque image-understanding model.
#[async_trait::async_trait]
pub trait VisionModel: Send + Sync + 'static {
    async fn describe(&self, image: &ImageRef, prompt: &str) -> Result<String, MetasightError>;
}

#[async_trait::async_trait]
impl<M> VisionModel for Arc<M>
where
    M: VisionModel + ?Sized,
{
    async fn describe(&self, image: &ImageRef, prompt: &str) -> Result<String, MetasightError> {
        (**self).describe(image, prompt).await
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct VisionArgs {
    /// What to look for in the image, in addition to the standard attributes.
    #[serde(default)]
    pub focus: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VisionReport {
    pub observations: String,
}

/// Runs the configured [`VisionModel`] over the run's image input.
pub struct VisionExtractor<M> {
    model: M,
}

impl<M> VisionExtractor<M>
where
    M: VisionModel,
{
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

fn vision_prompt(focus: Option<&str>) -> String {
    let mut prompt = String::from(
        "Describe this product image. Report the product name, the brand if it is printed \
         or visible, colors, materials you can identify, size or dimension indicators, \
         any text on the product or its packaging, and the product category.",
    );
    if let Some(focus) = focus.map(str::trim).filter(|focus| !focus.is_empty()) {
        prompt.push_str("\nAlso look for: ");
        prompt.push_str(focus);
    }
    prompt.push_str("\nOnly report what you can see. Leave out anything that is not visible.");
    prompt
}

#[async_trait::async_trait]
impl<M> TypedCapability for VisionExtractor<M>
where
    M: VisionModel,
{
    type Args = VisionArgs;
    type Output = VisionReport;

    const NAME: &'static str = "vision_extractor";
    const DESCRIPTION: &'static str =
        "Analyze the product image the run was started with and report visible attributes.";

    async fn run(
        &self,
        args: Self::Args,
        ctx: &CapabilityContext,
    ) -> Result<Self::Output, CapabilityError> {
        let InputRef::Image(image) = ctx.input.as_ref() else {
            return Err(CapabilityError::UnsupportedInput(format!(
                "vision extraction requires an image input, got {}",
                ctx.input.kind()
            )));
        };

        let prompt = vision_prompt(args.focus.as_deref());
        let observations = self
            .model
            .describe(image, &prompt)
            .await
            .map_err(|err| {
                if err.is_transient() {
                    CapabilityError::Transient(err.to_string())
                } else {
                    CapabilityError::ExecutionFailed(err.to_string())
                }
            })?;

        Ok(VisionReport { observations })
    }
}
