use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::class_def::ClassDefinition;
use crate::dex::error::DexError;
use crate::members::MethodDefinition;
use crate::opcodes::RCode;

bitflags! {
    /// Facts about a resolved call target that decide the invoke kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InvokeTraits: u16 {
        const DELEGATE_OWNER = 0x1;
        const STATIC = 0x2;
        /// Extension method compiled to a static helper.
        const EXTENSION = 0x4;
        /// The caller requires a super call (e.g. `base.Foo()`).
        const FORCE_SUPER = 0x8;
        const CONSTRUCTOR = 0x10;
        /// The target's owner is a base class of the caller's class.
        const OWNER_IS_BASE = 0x20;
        const USE_INTERFACE = 0x40;
        const DIRECT = 0x80;
        const INTERFACE_OWNER = 0x100;
    }
}

impl InvokeTraits {
    /// Traits derivable from a method defined in `owner`.
    pub fn of_definition(owner: &ClassDefinition, method: &MethodDefinition) -> InvokeTraits {
        let mut traits = InvokeTraits::empty();
        traits.set(InvokeTraits::STATIC, method.is_static());
        traits.set(InvokeTraits::CONSTRUCTOR, method.is_constructor());
        traits.set(InvokeTraits::DIRECT, method.is_direct());
        traits.set(InvokeTraits::INTERFACE_OWNER, owner.is_interface());
        traits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

/// A call site: the target name, whether it takes `this`, and the resolved
/// target if one is known.
#[derive(Debug, Clone, Copy)]
pub struct InvokeSite<'a> {
    pub name: &'a str,
    pub has_this: bool,
    /// IL `call` (as opposed to `callvirt`).
    pub is_special: bool,
    pub resolved: Option<InvokeTraits>,
}

pub fn invoke_kind(site: &InvokeSite) -> InvokeKind {
    if let Some(t) = site.resolved {
        if t.contains(InvokeTraits::DELEGATE_OWNER) {
            return InvokeKind::Interface;
        }
        if t.intersects(InvokeTraits::STATIC | InvokeTraits::EXTENSION) {
            return InvokeKind::Static;
        }
        if t.contains(InvokeTraits::FORCE_SUPER) {
            return InvokeKind::Super;
        }
        if site.is_special && !t.contains(InvokeTraits::CONSTRUCTOR) && t.contains(InvokeTraits::OWNER_IS_BASE) {
            return InvokeKind::Super;
        }
        if t.contains(InvokeTraits::USE_INTERFACE) {
            return InvokeKind::Interface;
        }
        if t.contains(InvokeTraits::DIRECT) {
            return InvokeKind::Direct;
        }
        if t.contains(InvokeTraits::INTERFACE_OWNER) {
            return InvokeKind::Interface;
        }
    }
    if !site.has_this {
        return InvokeKind::Static;
    }
    match site.name {
        "<init>" | "<clinit>" | ".ctor" | ".cctor" => InvokeKind::Direct,
        _ => InvokeKind::Virtual,
    }
}

/// More than five argument registers need the `/range` form.
pub fn requires_invoke_range(argument_registers: usize) -> bool {
    argument_registers > 5
}

pub fn invoke_opcode(kind: InvokeKind, argument_registers: usize) -> Result<RCode, DexError> {
    if argument_registers > u16::MAX as usize {
        return Err(DexError::unsupported_type(format!("{} argument registers do not fit an invoke", argument_registers)));
    }
    let code = match kind {
        InvokeKind::Virtual => RCode::InvokeVirtual,
        InvokeKind::Super => RCode::InvokeSuper,
        InvokeKind::Direct => RCode::InvokeDirect,
        InvokeKind::Static => RCode::InvokeStatic,
        InvokeKind::Interface => RCode::InvokeInterface,
    };
    if requires_invoke_range(argument_registers) {
        code.to_range()
            .ok_or_else(|| DexError::unsupported_type(format!("{} has no range form", code)))
    } else {
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::{AccessFlags, Prototype};

    fn site(name: &str, resolved: Option<InvokeTraits>) -> InvokeSite<'_> {
        InvokeSite { name, has_this: true, is_special: false, resolved }
    }

    #[test]
    fn resolved_targets() {
        assert_eq!(invoke_kind(&site("Invoke", Some(InvokeTraits::DELEGATE_OWNER | InvokeTraits::STATIC))), InvokeKind::Interface);
        assert_eq!(invoke_kind(&site("f", Some(InvokeTraits::EXTENSION))), InvokeKind::Static);
        assert_eq!(invoke_kind(&site("f", Some(InvokeTraits::FORCE_SUPER | InvokeTraits::DIRECT))), InvokeKind::Super);
        assert_eq!(invoke_kind(&site("f", Some(InvokeTraits::DIRECT))), InvokeKind::Direct);
        assert_eq!(invoke_kind(&site("f", Some(InvokeTraits::INTERFACE_OWNER))), InvokeKind::Interface);
        assert_eq!(invoke_kind(&site("f", Some(InvokeTraits::empty()))), InvokeKind::Virtual);

        let mut special = site("ToString", Some(InvokeTraits::OWNER_IS_BASE));
        special.is_special = true;
        assert_eq!(invoke_kind(&special), InvokeKind::Super);
        special.resolved = Some(InvokeTraits::OWNER_IS_BASE | InvokeTraits::CONSTRUCTOR | InvokeTraits::DIRECT);
        assert_eq!(invoke_kind(&special), InvokeKind::Direct);
    }

    #[test]
    fn unresolved_references() {
        assert_eq!(invoke_kind(&site("<init>", None)), InvokeKind::Direct);
        assert_eq!(invoke_kind(&site(".cctor", None)), InvokeKind::Direct);
        assert_eq!(invoke_kind(&site("run", None)), InvokeKind::Virtual);
        let mut stat = site("run", None);
        stat.has_this = false;
        assert_eq!(invoke_kind(&stat), InvokeKind::Static);
    }

    #[test]
    fn traits_from_definitions() {
        let mut iface = ClassDefinition::new("a.Runnable");
        iface.access_flags = AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
        let run = iface
            .new_method("run", Prototype::parse("()V").unwrap(), AccessFlags::PUBLIC | AccessFlags::ABSTRACT)
            .unwrap();
        let traits = InvokeTraits::of_definition(&iface, &run);
        assert_eq!(invoke_kind(&site("run", Some(traits))), InvokeKind::Interface);

        let ctor = iface
            .new_method("<init>", Prototype::parse("()V").unwrap(), AccessFlags::CONSTRUCTOR)
            .unwrap();
        let traits = InvokeTraits::of_definition(&iface, &ctor);
        assert_eq!(invoke_kind(&site("<init>", Some(traits))), InvokeKind::Direct);
    }

    #[test]
    fn range_form_above_five_registers() {
        assert_eq!(invoke_opcode(InvokeKind::Static, 5).unwrap(), RCode::InvokeStatic);
        assert_eq!(invoke_opcode(InvokeKind::Static, 6).unwrap(), RCode::InvokeStaticRange);
        assert_eq!(invoke_opcode(InvokeKind::Interface, 9).unwrap(), RCode::InvokeInterfaceRange);
    }
}
