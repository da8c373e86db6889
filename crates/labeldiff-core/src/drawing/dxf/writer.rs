use std::collections::HashMap;

use tracing::debug;

use super::reader::dim_text_height_index;
use super::{format_real, span_end, Tag};
use crate::drawing::model::{DrawingDocument, Entity, Layer, Rgb};
use crate::error::DocumentError;

/// Serialise a document read by [`read_dxf`](super::read_dxf).
///
/// Layer and entity spans are patched from the model; all other tags are
/// written back verbatim. Documents built in memory have no tag stream to
/// replay and are rejected.
pub fn write_dxf(doc: &DrawingDocument) -> Result<Vec<u8>, DocumentError> {
    let source = doc.source.as_ref().ok_or_else(|| {
        DocumentError::Unsupported("document was not read from DXF and cannot be written".to_string())
    })?;

    let mut patches: HashMap<usize, Patch<'_>> = HashMap::new();
    for layer in &doc.layers {
        if let Some(origin) = layer.origin {
            patches.insert(origin, Patch::Layer(layer));
        }
    }
    for entity in doc.entities() {
        if let Some(origin) = entity.origin {
            patches.insert(origin, Patch::Entity(entity));
        }
    }

    let tags = &source.tags;
    let mut out = Vec::with_capacity(tags.len() + patches.len());
    let mut i = 0;
    while i < tags.len() {
        match patches.get(&i) {
            Some(patch) => {
                let end = span_end(tags, i);
                let mut span = tags[i..end].to_vec();
                patch.apply(&mut span);
                out.extend(span);
                i = end;
            }
            None => {
                out.push(tags[i].clone());
                i += 1;
            }
        }
    }

    debug!(tags_in = tags.len(), tags_out = out.len(), patched = patches.len(), "dxf serialised");
    Ok(source.render(&out))
}

enum Patch<'a> {
    Layer(&'a Layer),
    Entity(&'a Entity),
}

impl Patch<'_> {
    fn apply(&self, span: &mut Vec<Tag>) {
        match self {
            Patch::Layer(layer) => {
                let color = if layer.off { -layer.color } else { layer.color };
                upsert(span, 62, Some(color.to_string()), &[70, 2]);
                upsert(span, 420, layer.true_color.map(rgb_value), &[6, 62]);
            }
            Patch::Entity(entity) => {
                upsert(span, 62, entity.color_index.map(|c| c.to_string()), &[6, 8]);
                upsert(span, 370, entity.lineweight.map(|w| w.to_string()), &[62, 6, 8]);
                upsert(span, 420, entity.true_color.map(rgb_value), &[370, 62, 6, 8]);
                upsert(span, 430, entity.color_book_name.clone(), &[420, 370, 62, 6, 8]);

                if let (Some(height), Some(k)) = (entity.text_height, find(span, 40)) {
                    replace_real(&mut span[k], height);
                }
                if let (Some(height), Some(k)) = (entity.dim_text_height, dim_text_height_index(span)) {
                    replace_real(&mut span[k], height);
                }
            }
        }
    }
}

/// Rewrite a real value only when it changed, keeping the original spelling otherwise.
fn replace_real(tag: &mut Tag, value: f64) {
    if tag.value.trim().parse::<f64>().ok() != Some(value) {
        tag.value = format_real(value);
    }
}

fn rgb_value(rgb: Rgb) -> String {
    rgb.packed().to_string()
}

/// Index of the first `code` tag before the xdata block.
fn find(span: &[Tag], code: i32) -> Option<usize> {
    span.iter()
        .enumerate()
        .skip(1)
        .take_while(|(_, t)| !t.is_xdata())
        .find(|(_, t)| t.code == code)
        .map(|(k, _)| k)
}

/// Replace, insert or remove the first `code` tag. A missing tag is inserted
/// after the first present code in `after`, or after the handle.
fn upsert(span: &mut Vec<Tag>, code: i32, value: Option<String>, after: &[i32]) {
    match (find(span, code), value) {
        (Some(k), Some(value)) => {
            if span[k].value.trim() != value {
                span[k].value = value;
            }
        }
        (Some(k), None) => {
            span.remove(k);
        }
        (None, Some(value)) => {
            let at = insert_position(span, after);
            span.insert(at, Tag::new(code, value));
        }
        (None, None) => {}
    }
}

fn insert_position(span: &[Tag], after: &[i32]) -> usize {
    if let Some(k) = after.iter().find_map(|&code| find(span, code)) {
        return k + 1;
    }
    find(span, 5).map(|k| k + 1).unwrap_or(1)
}
