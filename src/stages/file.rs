//! File stage: the bytes pass through unchanged and the asset is emitted
//! under a content-hashed name.

use super::{Stage, StageContext, StageInput, TransformError, TransformResult};
use crate::asset::AssetKind;
use crate::rules::StageId;

pub struct FileStage;

impl Stage for FileStage {
    fn id(&self) -> StageId {
        StageId::File
    }

    fn accepts(&self, _kind: AssetKind) -> bool {
        true
    }

    fn transform(
        &self,
        input: StageInput<'_>,
        _ctx: &StageContext<'_>,
    ) -> Result<TransformResult, TransformError> {
        Ok(TransformResult::new(input.content.to_vec(), input.kind))
    }
}
