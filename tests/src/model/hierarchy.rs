use crate::fixtures::base_derived;
use classcloak_core::hierarchy::CommonAncestorResolver;
use classcloak_core::{AccessFlags, OBJECT, Program, TypeDef};

fn with_interface() -> Program {
    let mut program = base_derived();
    let mut shape = TypeDef::new("app/Shape");
    shape.access |= AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
    program.insert(shape);
    let mut other = TypeDef::new("app/Other");
    other.super_name = Some("app/Base".into());
    program.insert(other);
    program
}

#[test]
fn resolve_is_reflexive() {
    let program = with_interface();
    let resolver = CommonAncestorResolver::with_platform(&program);
    for name in ["app/Base", "app/Derived", "app/Shape", "java/lang/String"] {
        assert_eq!(resolver.resolve(name, name), name);
    }
}

#[test]
fn ancestor_wins_in_either_order() {
    let program = with_interface();
    let resolver = CommonAncestorResolver::with_platform(&program);
    assert_eq!(resolver.resolve("app/Base", "app/Derived"), "app/Base");
    assert_eq!(resolver.resolve("app/Derived", "app/Base"), "app/Base");
    assert_eq!(resolver.resolve("app/Derived", "app/Other"), "app/Base");
    assert_eq!(
        resolver.resolve("java/lang/ArithmeticException", "java/lang/NullPointerException"),
        "java/lang/RuntimeException"
    );
}

#[test]
fn interfaces_degrade_to_the_root() {
    let program = with_interface();
    let resolver = CommonAncestorResolver::with_platform(&program);
    assert_eq!(resolver.resolve("app/Shape", "app/Base"), OBJECT);
    assert_eq!(resolver.resolve("app/Derived", "app/Shape"), OBJECT);
    assert_eq!(resolver.resolve("app/Unknown", "app/Base"), OBJECT);
}
