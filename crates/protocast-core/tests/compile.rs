//! End-to-end compilation of multi-file schemas

use pretty_assertions::assert_eq;
use protocast_core::classify::{WireCategory, WireType};
use protocast_core::model::{DefaultValue, FieldType, Label};
use protocast_core::schema::{Enum, Field, Message, ScalarType, SchemaFile};
use protocast_core::{CompileOptions, CompiledFile, Compiler, Error};

fn point_and_path() -> Vec<SchemaFile> {
    vec![
        SchemaFile::new("a.proto").message(
            Message::new("Point")
                .field(Field::new("x", "int32", 1))
                .field(Field::new("y", "int32", 2)),
        ),
        SchemaFile::new("b.proto").import("a.proto").message(
            Message::new("Path")
                .field(Field::repeated("pts", "Point", 1))
                .field(Field::map("tags", ScalarType::String, "Point", 2)),
        ),
    ]
}

fn canonical_names(file: &CompiledFile) -> Vec<String> {
    file.messages
        .iter()
        .map(|m| m.full_name.clone())
        .chain(file.enums.iter().map(|e| e.full_name.clone()))
        .collect()
}

#[test]
fn point_and_path_without_inlining() {
    let compiled = Compiler::new().compile(&point_and_path()).unwrap();
    assert_eq!(compiled.len(), 2);
    assert_eq!(compiled[0].name, "a.proto");
    assert_eq!(compiled[1].name, "b.proto");

    // B holds only its own declarations and refers to Point by name
    let b = &compiled[1];
    assert_eq!(canonical_names(b), vec![".Path".to_string()]);
    assert_eq!(b.referenced_files(), vec!["a.proto"]);

    let path = b.message(".Path").unwrap();
    let pts = path.field("pts").unwrap();
    assert_eq!(pts.label, Label::Repeated);
    assert_eq!(pts.category, WireCategory::Message);
    let point = pts.type_ref().unwrap();
    assert_eq!(point.full_name, ".Point");
    assert_eq!(point.file, "a.proto");

    let tags = path.field("tags").unwrap();
    assert_eq!(tags.category, WireCategory::Map);
    assert_eq!(tags.wire_type, WireType::Len);
    let entry = tags.map_entry().unwrap();
    assert_eq!(entry.name, "TagsEntry");
    assert_eq!(entry.key.number, 1);
    assert_eq!(entry.key.ty, FieldType::Scalar(ScalarType::String));
    assert_eq!(entry.value.number, 2);
    assert_eq!(entry.value.category, WireCategory::Message);
    assert_eq!(entry.value.type_ref().unwrap().file, "a.proto");
}

#[test]
fn inlining_keeps_canonical_names() {
    let files = point_and_path();

    let separate = Compiler::new().compile(&files).unwrap();
    let mut expected: Vec<String> = separate.iter().rev().flat_map(canonical_names).collect();
    expected.dedup();

    let inlined = Compiler::with_options(CompileOptions::new().include_imports(true))
        .compile(&files)
        .unwrap();
    let b = &inlined[1];
    assert_eq!(canonical_names(b), expected);

    // Own declarations come first, inlined ones keep their origin
    assert_eq!(b.own_messages().count(), 1);
    let imported: Vec<_> = b.imported_messages().map(|m| m.origin.as_str()).collect();
    assert_eq!(imported, vec!["a.proto"]);
    assert_eq!(b.message(".Point"), separate[0].message(".Point"));
}

#[test]
fn diamond_imports_inline_once() {
    let files = vec![
        SchemaFile::new("base.proto").package("base").message(Message::new("Id")),
        SchemaFile::new("left.proto")
            .package("left")
            .import("base.proto")
            .message(Message::new("L").field(Field::new("id", "base.Id", 1))),
        SchemaFile::new("right.proto")
            .package("right")
            .import("base.proto")
            .message(Message::new("R").field(Field::new("id", ".base.Id", 1))),
        SchemaFile::new("top.proto")
            .import("left.proto")
            .import("right.proto")
            .message(
                Message::new("Top")
                    .field(Field::new("l", "left.L", 1))
                    .field(Field::new("r", "right.R", 2)),
            ),
    ];
    let compiled = Compiler::with_options(CompileOptions::new().include_imports(true))
        .compile_selected(&files, &["top.proto"])
        .unwrap();
    assert_eq!(
        canonical_names(&compiled[0]),
        vec![".Top", ".left.L", ".base.Id", ".right.R"]
    );
}

#[test]
fn fully_qualified_resolution_ignores_request_order() {
    let forward = vec![
        SchemaFile::new("geo.proto").package("geo").message(Message::new("Point")),
        SchemaFile::new("map.proto")
            .package("map")
            .import("geo.proto")
            .message(Message::new("Pin").field(Field::new("at", ".geo.Point", 1))),
    ];
    let mut backward = forward.clone();
    backward.reverse();

    let a = Compiler::new().compile(&forward).unwrap();
    let b = Compiler::new().compile(&backward).unwrap();
    assert_eq!(a[1], b[0]);
    assert_eq!(a[0], b[1]);
}

#[test]
fn sibling_imports_make_short_names_ambiguous() {
    let files = vec![
        SchemaFile::new("a.proto").package("a").message(Message::new("Point")),
        SchemaFile::new("b.proto").package("b").message(Message::new("Point")),
        SchemaFile::new("c.proto")
            .package("c")
            .import("a.proto")
            .import("b.proto")
            .message(Message::new("Path").field(Field::new("p", "Point", 1))),
    ];
    match Compiler::new().compile(&files).unwrap_err() {
        Error::AmbiguousType { type_name, field, candidates } => {
            assert_eq!(type_name, "Point");
            assert_eq!(field, ".c.Path.p");
            assert_eq!(candidates, vec!["a.proto", "b.proto"]);
        }
        other => panic!("expected ambiguity, got {other}"),
    }

    // Qualifying the name settles it
    let mut files = files;
    files[2].messages[0].fields[0] = Field::new("p", "b.Point", 1);
    let compiled = Compiler::new().compile(&files).unwrap();
    let p = &compiled[2].messages[0].fields[0];
    assert_eq!(p.type_ref().unwrap().full_name, ".b.Point");
}

fn unpackaged_points() -> Vec<SchemaFile> {
    vec![
        SchemaFile::new("a.proto")
            .message(Message::new("Point").field(Field::new("x", "int32", 1))),
        SchemaFile::new("b.proto")
            .message(Message::new("Point").field(Field::new("y", "int64", 1))),
    ]
}

#[test]
fn unpackaged_sibling_imports_are_ambiguous() {
    let mut files = unpackaged_points();
    files.push(
        SchemaFile::new("c.proto")
            .import("a.proto")
            .import("b.proto")
            .message(Message::new("Path").field(Field::new("p", "Point", 1))),
    );
    match Compiler::new().compile(&files).unwrap_err() {
        Error::AmbiguousType { type_name, field, candidates } => {
            assert_eq!(type_name, "Point");
            assert_eq!(field, ".Path.p");
            assert_eq!(candidates, vec!["a.proto", "b.proto"]);
        }
        other => panic!("expected ambiguity, got {other}"),
    }
}

#[test]
fn unrelated_files_may_share_a_name() {
    let mut files = unpackaged_points();
    files.push(
        SchemaFile::new("c.proto")
            .import("a.proto")
            .message(Message::new("Path").field(Field::new("p", "Point", 1))),
    );

    let compiled = Compiler::new().compile_selected(&files, &["c.proto"]).unwrap();
    let p = compiled[0].messages[0].field("p").unwrap().type_ref().unwrap();
    assert_eq!(p.full_name, ".Point");
    assert_eq!(p.file, "a.proto");

    // Every file compiles, each Point stays with its own file
    let all = Compiler::new().compile(&files).unwrap();
    assert_eq!(all[0].messages[0].fields[0].name, "x");
    assert_eq!(all[1].messages[0].fields[0].name, "y");
}

#[test]
fn import_cycle_reported_before_resolution() {
    // The dangling type would fail resolution; the cycle must win
    let files = vec![
        SchemaFile::new("a.proto")
            .import("b.proto")
            .message(Message::new("A").field(Field::new("x", "Nowhere", 1))),
        SchemaFile::new("b.proto").import("a.proto"),
    ];
    assert!(matches!(
        Compiler::new().compile(&files),
        Err(Error::ImportCycle { .. })
    ));
}

#[test]
fn mutually_referencing_messages_across_files() {
    let files = vec![
        SchemaFile::new("order.proto")
            .import("customer.proto")
            .message(Message::new("Order").field(Field::new("customer", "Customer", 1))),
        SchemaFile::new("customer.proto")
            .message(Message::new("Customer").field(Field::repeated("orders", "Order", 1))),
    ];
    // customer.proto cannot see Order without importing it
    assert!(matches!(
        Compiler::new().compile(&files),
        Err(Error::UnresolvedType { .. })
    ));

    let files = vec![SchemaFile::new("shop.proto")
        .message(Message::new("Order").field(Field::new("customer", "Customer", 1)))
        .message(Message::new("Customer").field(Field::repeated("orders", "Order", 1)))];
    let compiled = Compiler::new().compile(&files).unwrap();
    let order = compiled[0].message(".Order").unwrap();
    assert_eq!(order.fields[0].type_ref().unwrap().full_name, ".Customer");
}

#[test]
fn color_enum_falls_back_to_first_member() {
    let files = vec![
        SchemaFile::new("color.proto").enumeration(Enum::new(
            "Color",
            [("RED", 0), ("GREEN", 1), ("BLUE", 2)],
        )),
        SchemaFile::new("paint.proto")
            .import("color.proto")
            .message(Message::new("Paint").field(Field::new("color", "Color", 1))),
    ];
    let compiled = Compiler::new().compile(&files).unwrap();

    let color = compiled[0].enumeration(".Color").unwrap();
    assert_eq!(color.value_for(99).name, "RED");
    assert_eq!(color.value_for(99), color.default_value());
    assert_eq!(color.value_for(1).name, "GREEN");

    let field = &compiled[1].messages[0].fields[0];
    assert_eq!(field.category, WireCategory::Enum);
    assert_eq!(
        field.default,
        DefaultValue::EnumMember {
            name: "RED".to_string(),
            number: 0
        }
    );
}

#[test]
fn proto2_optional_and_wrappers_track_presence() {
    let files = vec![SchemaFile::new("legacy.proto")
        .syntax(protocast_core::schema::Syntax::Proto2)
        .message(
            Message::new("Legacy")
                .field(Field::new("name", "string", 1).optional())
                .field(Field::new("count", "google.protobuf.UInt64Value", 2))
                .field(Field::repeated("tags", "string", 3)),
        )];
    let compiled = Compiler::new().compile(&files).unwrap();
    let legacy = &compiled[0].messages[0];

    assert!(legacy.fields[0].presence_tracked);
    assert_eq!(legacy.fields[1].ty, FieldType::Scalar(ScalarType::Uint64));
    assert_eq!(legacy.fields[1].category, WireCategory::UnsignedVarint);
    assert!(legacy.fields[1].presence_tracked);
    assert!(!legacy.fields[2].presence_tracked);
    assert_eq!(legacy.fields[2].default, DefaultValue::Empty);
}
