use crate::error::Result;

/// Sampling parameters for a single generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Produces text from a system instruction and a user instruction.
///
/// Calls are synchronous and return the complete output; there is no
/// streaming. An empty `system` means no system instruction is sent.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        system: &str,
        user: &str,
        params: GenerationParams,
    ) -> Result<String>;
}
