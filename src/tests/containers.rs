use crate::class_def::ClassDefinition;
use crate::container::{ClassArena, ClassId, DexId};
use crate::dex::error::ErrorKind;
use crate::lookup::{hierarchicalize, DexLookup};
use crate::members::{AccessFlags, Prototype};
use crate::types::PrimitiveType;

fn class_with_members(fullname: &str) -> ClassDefinition {
    let mut class = ClassDefinition::new(fullname);
    let field = class.new_field("count", PrimitiveType::Int.into(), AccessFlags::PRIVATE);
    class.add_field(field).unwrap();
    let method = class.new_method("run", Prototype::parse("()V").unwrap(), AccessFlags::PUBLIC).unwrap();
    class.add_method(method).unwrap();
    class
}

fn outer_and_inner(arena: &mut ClassArena) -> (DexId, ClassId, ClassId) {
    let outer = arena.alloc(class_with_members("app.Outer"));
    let inner = arena.alloc(class_with_members("app.Outer$Inner"));
    let hierarchy = hierarchicalize(arena, &[outer, inner]);
    assert_eq!(hierarchy.top_level, vec![outer]);
    let dex = arena.create_dex();
    arena.add_class(dex, outer).unwrap();
    (dex, outer, inner)
}

#[test]
fn renaming_top_level_class_moves_its_index_entry() {
    let mut arena = ClassArena::new();
    let (dex, outer, _) = outer_and_inner(&mut arena);

    arena.rename_class(outer, "app.Renamed").unwrap();
    let d = arena.dex(dex).unwrap();
    assert!(d.is_top_level("app.Renamed"));
    assert!(!d.is_top_level("app.Outer"));
    assert_eq!(d.get_class("app.Renamed"), Some(outer));
    assert!(d.get_class("app.Outer").is_none());
    assert_eq!(d.class_count(), 2);
}

#[test]
fn renaming_inner_class_stays_in_inner_index() {
    let mut arena = ClassArena::new();
    let (dex, _, inner) = outer_and_inner(&mut arena);

    arena.set_class_name(inner, "Outer$Nested").unwrap();
    let d = arena.dex(dex).unwrap();
    assert!(d.is_inner("app.Outer$Nested"));
    assert!(!d.is_top_level("app.Outer$Nested"));
    assert!(d.get_class("app.Outer$Inner").is_none());
    assert_eq!(arena.get_class(dex, "app.Outer$Nested"), Some(inner));
}

#[test]
fn members_follow_a_namespace_change() {
    let mut arena = ClassArena::new();
    let (dex, outer, _) = outer_and_inner(&mut arena);

    arena.set_class_namespace(outer, "org/example").unwrap();
    assert_eq!(arena[outer].fullname(), "org.example.Outer");
    assert_eq!(arena[outer].fields()[0].owner().fullname(), "org.example.Outer");
    assert_eq!(arena[outer].methods()[0].reference().owner.descriptor(), "Lorg/example/Outer;");
    assert!(arena.get_method(dex, "org.example.Outer", "run", "()V").is_some());
    assert!(arena.get_method(dex, "app.Outer", "run", "()V").is_none());
}

#[test]
fn rename_updates_every_dex_holding_the_class() {
    let mut arena = ClassArena::new();
    let shared = arena.alloc(ClassDefinition::new("app.Shared"));
    let first = arena.create_dex();
    let second = arena.create_dex();
    arena.add_class(first, shared).unwrap();
    arena.add_class(second, shared).unwrap();

    arena.rename_class(shared, "app.Common").unwrap();
    for dex in [first, second] {
        assert_eq!(arena.get_class(dex, "app.Common"), Some(shared));
        assert!(arena.get_class(dex, "app.Shared").is_none());
    }
}

#[test]
fn rename_into_an_existing_name_is_rejected() {
    let mut arena = ClassArena::new();
    let (dex, outer, inner) = outer_and_inner(&mut arena);

    let err = arena.rename_class(inner, "app.Outer").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structure);
    assert_eq!(arena[inner].fullname(), "app.Outer$Inner");
    assert_eq!(arena.get_class(dex, "app.Outer"), Some(outer));
    assert_eq!(arena.get_class(dex, "app.Outer$Inner"), Some(inner));
}

#[test]
fn lookup_is_a_snapshot() {
    let mut arena = ClassArena::new();
    let (_, outer, inner) = outer_and_inner(&mut arena);

    let before = DexLookup::new(&arena, &[outer, inner]);
    arena.rename_class(outer, "app.Moved").unwrap();
    assert_eq!(before.get_class("app.Outer"), Some(outer));
    assert!(before.get_class("app.Moved").is_none());

    let after = DexLookup::new(&arena, &[outer, inner]);
    assert_eq!(after.get_class("app.Moved"), Some(outer));
    assert_eq!(after.get_method("app.Moved", "run", "()V"), Some((outer, 0)));
}

#[test]
fn orphaned_inner_class_stays_top_level() {
    let mut arena = ClassArena::new();
    let orphan = arena.alloc(ClassDefinition::new("app.Gone$Inner"));
    let plain = arena.alloc(ClassDefinition::new("app.Plain"));

    let hierarchy = hierarchicalize(&mut arena, &[orphan, plain]);
    assert_eq!(hierarchy.top_level, vec![orphan, plain]);
    assert_eq!(hierarchy.diagnostics.len(), 1);
    assert_eq!(hierarchy.diagnostics[0].class, orphan);
    assert_eq!(hierarchy.diagnostics[0].missing_owner, "app.Gone");

    let dex = arena.create_dex();
    for id in &hierarchy.top_level {
        arena.add_class(dex, *id).unwrap();
    }
    assert!(arena.dex(dex).unwrap().is_top_level("app.Gone$Inner"));
}

#[test]
fn flatten_lists_owners_before_their_inner_classes() {
    let mut arena = ClassArena::new();
    let a = arena.alloc(ClassDefinition::new("p.A"));
    let a_x = arena.alloc(ClassDefinition::new("p.A$X"));
    let a_x_y = arena.alloc(ClassDefinition::new("p.A$X$Y"));
    let a_z = arena.alloc(ClassDefinition::new("p.A$Z"));
    let b = arena.alloc(ClassDefinition::new("p.B"));

    let hierarchy = hierarchicalize(&mut arena, &[a_x_y, b, a_z, a, a_x]);
    assert_eq!(hierarchy.top_level, vec![b, a]);
    assert!(hierarchy.diagnostics.is_empty());

    let dex = arena.create_dex();
    arena.add_class(dex, a).unwrap();
    arena.add_class(dex, b).unwrap();
    assert_eq!(arena.flatten(dex), vec![a, a_z, a_x, a_x_y, b]);
    assert_eq!(arena.dex(dex).unwrap().class_count(), 5);
}
