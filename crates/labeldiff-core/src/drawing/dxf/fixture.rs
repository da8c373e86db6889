//! Small hand-written drawings for codec and engine tests.

pub(crate) fn entity_tags(tags: &[(i32, &str)]) -> String {
    tags.iter()
        .map(|(code, value)| format!("{code:>3}\n{value}\n"))
        .collect()
}

/// Two layers (one switched off), a user block, a dimension block, the
/// model and paper space blocks and five model/paper space entities.
pub(crate) fn drawing() -> String {
    let mut dxf = String::new();
    dxf.push_str(&entity_tags(&[
        (0, "SECTION"),
        (2, "HEADER"),
        (9, "$ACADVER"),
        (1, "AC1015"),
        (0, "ENDSEC"),
        (0, "SECTION"),
        (2, "TABLES"),
        (0, "TABLE"),
        (2, "LAYER"),
        (70, "2"),
        (0, "LAYER"),
        (5, "10"),
        (100, "AcDbSymbolTableRecord"),
        (100, "AcDbLayerTableRecord"),
        (2, "0"),
        (70, "0"),
        (62, "7"),
        (6, "CONTINUOUS"),
        (0, "LAYER"),
        (5, "11"),
        (100, "AcDbSymbolTableRecord"),
        (100, "AcDbLayerTableRecord"),
        (2, "HIDDEN"),
        (70, "0"),
        (62, "-3"),
        (6, "DASHED"),
        (420, "16711680"),
        (0, "ENDTAB"),
        (0, "ENDSEC"),
        (0, "SECTION"),
        (2, "BLOCKS"),
        (0, "BLOCK"),
        (8, "0"),
        (2, "*Model_Space"),
        (0, "ENDBLK"),
        (0, "BLOCK"),
        (8, "0"),
        (2, "*Paper_Space"),
        (0, "ENDBLK"),
        (0, "BLOCK"),
        (8, "0"),
        (2, "TERMINAL"),
        (0, "LINE"),
        (5, "20"),
        (8, "0"),
        (62, "1"),
        (0, "TEXT"),
        (5, "21"),
        (8, "0"),
        (40, "0.8"),
        (1, "R1"),
        (0, "ENDBLK"),
        (0, "BLOCK"),
        (8, "0"),
        (2, "*D1"),
        (0, "LINE"),
        (5, "30"),
        (8, "0"),
        (62, "2"),
        (0, "ENDBLK"),
        (0, "ENDSEC"),
        (0, "SECTION"),
        (2, "ENTITIES"),
        (0, "LINE"),
        (5, "1A"),
        (100, "AcDbEntity"),
        (8, "WIRES"),
        (6, "DASHED"),
        (62, "4"),
        (370, "50"),
        (420, "65280"),
        (100, "AcDbLine"),
        (10, "0.0"),
        (20, "0.0"),
        (11, "10.0"),
        (21, "0.0"),
        (0, "MTEXT"),
        (5, "1B"),
        (100, "AcDbEntity"),
        (8, "TEXT"),
        (100, "AcDbMText"),
        (10, "1.0"),
        (20, "1.0"),
        (40, "1.0"),
        (3, "{\\C2;(B"),
        (1, "\\PL)}"),
        (0, "DIMENSION"),
        (5, "1C"),
        (100, "AcDbEntity"),
        (8, "DIM"),
        (2, "*D1"),
        (1001, "ACAD"),
        (1000, "DSTYLE"),
        (1002, "{"),
        (1070, "140"),
        (1040, "1.8"),
        (1070, "41"),
        (1040, "2.0"),
        (1002, "}"),
        (0, "POLYLINE"),
        (5, "1D"),
        (8, "0"),
        (430, "PANTONE$123"),
        (66, "1"),
        (0, "VERTEX"),
        (5, "1E"),
        (8, "0"),
        (0, "SEQEND"),
        (5, "1F"),
        (8, "0"),
        (0, "TEXT"),
        (5, "2A"),
        (100, "AcDbEntity"),
        (67, "1"),
        (410, "Layout1"),
        (8, "0"),
        (40, "5.0"),
        (1, "(BL)"),
        (0, "ENDSEC"),
        (0, "EOF"),
    ]));
    dxf
}
