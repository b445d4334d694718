//! Raw-text stage: file content as a default-exported string module.

use super::{Stage, StageContext, StageInput, TransformError, TransformResult};
use crate::asset::AssetKind;
use crate::rules::StageId;

const PREFIX: &str = "export default ";
const SUFFIX: &str = ";\n";

pub struct RawTextStage;

impl Stage for RawTextStage {
    fn id(&self) -> StageId {
        StageId::RawText
    }

    fn accepts(&self, kind: AssetKind) -> bool {
        !matches!(kind, AssetKind::Image | AssetKind::Font)
    }

    fn transform(
        &self,
        input: StageInput<'_>,
        _ctx: &StageContext<'_>,
    ) -> Result<TransformResult, TransformError> {
        let literal = serde_json::to_string(input.text()?).map_err(|_| TransformError::Encoding)?;
        let module = format!("{PREFIX}{literal}{SUFFIX}");
        Ok(TransformResult::new(module.into_bytes(), AssetKind::Script))
    }
}

/// The string literal exported by a module this stage produced, or `None`
/// for any other script.
pub fn default_export(module: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(module).ok()?;
    let literal = text.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    serde_json::from_str::<String>(literal).ok()?;
    Some(literal)
}
