use std::str::FromStr;

use tracing::debug;

use super::{check_not_binary, line_of, parse_tags, span_end, DxfSource, Tag, TextEncoding};
use crate::drawing::model::{BlockDefinition, DrawingDocument, Entity, EntityKind, Layer, Rgb, TextKind};
use crate::error::DocumentError;

const MODEL_SPACE_BLOCK: &str = "*Model_Space";
const PAPER_SPACE_BLOCK: &str = "*Paper_Space";

/// DSTYLE override code for the dimension text height.
const DIMTXT: &str = "140";

/// Parse an ASCII DXF file.
pub fn read_dxf(bytes: &[u8]) -> Result<DrawingDocument, DocumentError> {
    check_not_binary(bytes)?;
    let (text, encoding) = TextEncoding::decode(bytes);
    let line_ending = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let tags = parse_tags(&text)?;

    let mut doc = DrawingDocument::new();
    let mut sections = 0;
    let mut i = 0;
    while i < tags.len() {
        if !tags[i].is(0, "SECTION") {
            i += 1;
            continue;
        }
        let name = match tags.get(i + 1) {
            Some(tag) if tag.code == 2 => tag.value.trim().to_string(),
            _ => return Err(DocumentError::parse(line_of(i), "SECTION without a name")),
        };
        let body = i + 2;
        let end = (body..tags.len())
            .find(|&j| tags[j].is(0, "ENDSEC"))
            .ok_or_else(|| DocumentError::parse(line_of(i), format!("section {name} is not terminated")))?;

        match name.as_str() {
            "TABLES" => read_layers(&tags, body, end, &mut doc)?,
            "BLOCKS" => read_blocks(&tags, body, end, &mut doc)?,
            "ENTITIES" => read_entities(&tags, body, end, &mut doc)?,
            _ => {}
        }
        sections += 1;
        i = end + 1;
    }

    if sections == 0 {
        return Err(DocumentError::parse(1, "no SECTION found"));
    }

    debug!(
        layers = doc.layers.len(),
        blocks = doc.blocks.len(),
        model_space = doc.model_space.len(),
        paper_layouts = doc.paper_layouts.len(),
        "dxf parsed"
    );

    doc.source = Some(DxfSource {
        tags,
        encoding,
        line_ending,
    });
    Ok(doc)
}

fn read_layers(tags: &[Tag], start: usize, end: usize, doc: &mut DrawingDocument) -> Result<(), DocumentError> {
    for i in start..end {
        if tags[i].is(0, "LAYER") {
            let span = &tags[i..span_end(tags, i).min(end)];
            let name = first_value(span, 2).unwrap_or_default().to_string();
            let color: i16 = parse_first(span, 62, i)?.unwrap_or(7);
            let mut layer = Layer::new(name, color);
            layer.true_color = parse_first::<u32>(span, 420, i)?.map(Rgb::from_packed);
            layer.origin = Some(i);
            doc.layers.push(layer);
        }
    }
    Ok(())
}

fn read_blocks(tags: &[Tag], start: usize, end: usize, doc: &mut DrawingDocument) -> Result<(), DocumentError> {
    let mut i = start;
    while i < end {
        if !tags[i].is(0, "BLOCK") {
            i += 1;
            continue;
        }
        let header_end = span_end(tags, i).min(end);
        let name = first_value(&tags[i..header_end], 2).unwrap_or_default().to_string();

        let mut entities = Vec::new();
        let mut j = header_end;
        while j < end && !tags[j].is(0, "ENDBLK") {
            let next = span_end(tags, j).min(end);
            if !is_sub_entity(&tags[j]) {
                entities.push(read_entity(tags, j, next)?);
            }
            j = next;
        }
        if j >= end {
            return Err(DocumentError::parse(line_of(i), format!("block {name} has no ENDBLK")));
        }

        if name.eq_ignore_ascii_case(MODEL_SPACE_BLOCK) {
            doc.model_space.extend(entities.into_iter().map(|(e, _)| e));
        } else if starts_with_ignore_case(&name, PAPER_SPACE_BLOCK) {
            for (entity, layout) in entities {
                let layout = layout.unwrap_or_else(|| name.clone());
                doc.paper_layout_mut(&layout).entities.push(entity);
            }
        } else {
            doc.blocks.push(BlockDefinition {
                name,
                entities: entities.into_iter().map(|(e, _)| e).collect(),
            });
        }
        i = j + 1;
    }
    Ok(())
}

fn read_entities(tags: &[Tag], start: usize, end: usize, doc: &mut DrawingDocument) -> Result<(), DocumentError> {
    let mut i = start;
    while i < end {
        let next = span_end(tags, i).min(end);
        if tags[i].code == 0 && !is_sub_entity(&tags[i]) {
            let (entity, layout) = read_entity(tags, i, next)?;
            match layout {
                Some(layout) => doc.paper_layout_mut(&layout).entities.push(entity),
                None => doc.model_space.push(entity),
            }
        }
        i = next;
    }
    Ok(())
}

/// Project one entity span. Returns the paper layout name when the entity
/// lives in paper space.
fn read_entity(tags: &[Tag], start: usize, end: usize) -> Result<(Entity, Option<String>), DocumentError> {
    let span = &tags[start..end];
    let mut entity = Entity::new(span[0].value.trim());
    entity.origin = Some(start);
    entity.handle = first_value(span, 5).map(str::to_string);
    entity.layer = first_value(span, 8).map(str::to_string);
    entity.color_index = parse_first(span, 62, start)?;
    entity.true_color = parse_first::<u32>(span, 420, start)?.map(Rgb::from_packed);
    entity.color_book_name = first_value(span, 430).map(str::to_string);
    entity.lineweight = parse_first(span, 370, start)?;

    match entity.kind {
        EntityKind::Text(kind) => {
            entity.text_content = text_content(span, kind);
            entity.text_height = parse_first(span, 40, start)?;
        }
        EntityKind::Dimension => {
            entity.dim_text_height = dim_text_height(span, start)?;
        }
        _ => {}
    }

    let paper = parse_first::<i16>(span, 67, start)?.unwrap_or(0) == 1;
    let layout = if paper {
        Some(first_value(span, 410).unwrap_or(PAPER_SPACE_BLOCK).to_string())
    } else {
        None
    };
    Ok((entity, layout))
}

fn text_content(span: &[Tag], kind: TextKind) -> Option<String> {
    let main = first_value_raw(span, 1);
    match kind {
        TextKind::MText => {
            let mut text: String = body(span).filter(|t| t.code == 3).map(|t| t.value.as_str()).collect();
            if let Some(main) = main {
                text.push_str(main);
            }
            (main.is_some() || !text.is_empty()).then_some(text)
        }
        _ => main.map(str::to_string),
    }
}

/// `1070 140` followed by `1040 <height>` inside the DSTYLE xdata.
fn dim_text_height(span: &[Tag], start: usize) -> Result<Option<f64>, DocumentError> {
    match dim_text_height_index(span) {
        Some(k) => parse_value(&span[k], start + k).map(Some),
        None => Ok(None),
    }
}

pub(super) fn dim_text_height_index(span: &[Tag]) -> Option<usize> {
    span.windows(2)
        .position(|w| w[0].is(1070, DIMTXT) && w[1].code == 1040)
        .map(|k| k + 1)
}

/// Tags before the xdata block.
fn body(span: &[Tag]) -> impl Iterator<Item = &Tag> {
    span.iter().skip(1).take_while(|t| !t.is_xdata())
}

fn first_value_raw(span: &[Tag], code: i32) -> Option<&str> {
    body(span).find(|t| t.code == code).map(|t| t.value.as_str())
}

fn first_value(span: &[Tag], code: i32) -> Option<&str> {
    first_value_raw(span, code).map(str::trim)
}

fn parse_first<T: FromStr>(span: &[Tag], code: i32, start: usize) -> Result<Option<T>, DocumentError> {
    match body(span).position(|t| t.code == code) {
        Some(k) => parse_value(&span[k + 1], start + k + 1).map(Some),
        None => Ok(None),
    }
}

fn parse_value<T: FromStr>(tag: &Tag, index: usize) -> Result<T, DocumentError> {
    tag.value.trim().parse::<T>().map_err(|_| {
        DocumentError::parse(
            line_of(index) + 1,
            format!("group code {} has invalid value {:?}", tag.code, tag.value),
        )
    })
}

/// Polyline vertices and sequence ends belong to their parent entity.
fn is_sub_entity(tag: &Tag) -> bool {
    tag.code == 0 && matches!(tag.value.trim(), "VERTEX" | "SEQEND")
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}
