//! Register canonicalization.
//!
//! Machine code names one physical register through several width-specific aliases
//! (`al`/`ax`/`eax`/`rax` on x86-64, `w3`/`x3` on ARM64). Promotion keys variables by
//! register name, so every alias is rewritten to a single canonical spelling first.
//! Canonical names map to themselves, which makes canonicalization idempotent.

use crate::isil::InstructionSet;

/// Returns the canonical name of `register` for the given instruction-set family.
///
/// x86-64 general purpose registers collapse to their 64-bit names and vector
/// registers are kept. ARM64 `Wn`/`Xn` collapse to `Xn`, scalar float views
/// `Bn`/`Hn`/`Sn`/`Dn`/`Qn` widen to the vector lane `Vn`, and `sp`/`wsp` become `SP`.
/// Unknown names are returned unchanged.
///
/// # Examples
///
/// ```rust
/// use isilift::{isil::InstructionSet, lifter::canonical_register};
///
/// assert_eq!(canonical_register(InstructionSet::X86_64, "eax"), "rax");
/// assert_eq!(canonical_register(InstructionSet::X86_64, "r9d"), "r9");
/// assert_eq!(canonical_register(InstructionSet::Arm64, "w3"), "X3");
/// assert_eq!(canonical_register(InstructionSet::Arm64, "d1"), "V1");
/// ```
#[must_use]
pub fn canonical_register(isa: InstructionSet, register: &str) -> String {
    match isa {
        InstructionSet::X86_64 => canonical_x64(register),
        InstructionSet::Arm64 => canonical_arm64(register),
    }
}

/// Returns the stack pointer's canonical name.
#[must_use]
pub fn stack_pointer(isa: InstructionSet) -> &'static str {
    match isa {
        InstructionSet::X86_64 => "rsp",
        InstructionSet::Arm64 => "SP",
    }
}

fn canonical_x64(register: &str) -> String {
    let lower = register.to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "al" | "ah" | "ax" | "eax" | "rax" => "rax",
        "bl" | "bh" | "bx" | "ebx" | "rbx" => "rbx",
        "cl" | "ch" | "cx" | "ecx" | "rcx" => "rcx",
        "dl" | "dh" | "dx" | "edx" | "rdx" => "rdx",
        "sil" | "si" | "esi" | "rsi" => "rsi",
        "dil" | "di" | "edi" | "rdi" => "rdi",
        "spl" | "sp" | "esp" | "rsp" => "rsp",
        "bpl" | "bp" | "ebp" | "rbp" => "rbp",
        _ => return numbered_x64(&lower).unwrap_or(lower),
    };
    canonical.to_string()
}

/// `r8`..`r15` with optional `b`/`w`/`d`/`l` width suffix.
fn numbered_x64(lower: &str) -> Option<String> {
    let digits = lower.strip_prefix('r')?;
    let digits = digits
        .strip_suffix(['b', 'w', 'd', 'l'])
        .unwrap_or(digits);
    let number: u8 = digits.parse().ok()?;
    (8..=15).contains(&number).then(|| format!("r{number}"))
}

fn canonical_arm64(register: &str) -> String {
    let lower = register.to_ascii_lowercase();
    if lower == "sp" || lower == "wsp" {
        return "SP".to_string();
    }

    let mut chars = lower.chars();
    let Some(prefix) = chars.next() else {
        return register.to_string();
    };
    let rest = chars.as_str();
    let Ok(number) = rest.parse::<u8>() else {
        return register.to_string();
    };
    if number > 31 {
        return register.to_string();
    }

    match prefix {
        'w' | 'x' => format!("X{number}"),
        'b' | 'h' | 's' | 'd' | 'q' | 'v' => format!("V{number}"),
        _ => register.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const X64_ALIASES: &[(&str, &str)] = &[
        ("al", "rax"),
        ("ax", "rax"),
        ("eax", "rax"),
        ("rax", "rax"),
        ("bl", "rbx"),
        ("ecx", "rcx"),
        ("dx", "rdx"),
        ("sil", "rsi"),
        ("edi", "rdi"),
        ("esp", "rsp"),
        ("bpl", "rbp"),
        ("ebp", "rbp"),
        ("r8b", "r8"),
        ("r8w", "r8"),
        ("r8d", "r8"),
        ("r15d", "r15"),
        ("EAX", "rax"),
        ("xmm0", "xmm0"),
        ("ymm3", "ymm3"),
        ("r16d", "r16d"),
    ];

    const ARM64_ALIASES: &[(&str, &str)] = &[
        ("W0", "X0"),
        ("x0", "X0"),
        ("X0", "X0"),
        ("w29", "X29"),
        ("sp", "SP"),
        ("wsp", "SP"),
        ("s2", "V2"),
        ("d7", "V7"),
        ("q1", "V1"),
        ("V4", "V4"),
        ("xzr", "xzr"),
        ("x40", "x40"),
    ];

    #[test]
    fn test_x64_aliases() {
        for (alias, expected) in X64_ALIASES {
            assert_eq!(canonical_register(InstructionSet::X86_64, alias), *expected, "{alias}");
        }
    }

    #[test]
    fn test_arm64_aliases() {
        for (alias, expected) in ARM64_ALIASES {
            assert_eq!(canonical_register(InstructionSet::Arm64, alias), *expected, "{alias}");
        }
    }

    #[test]
    fn test_idempotence() {
        for (isa, table) in [
            (InstructionSet::X86_64, X64_ALIASES),
            (InstructionSet::Arm64, ARM64_ALIASES),
        ] {
            for (alias, _) in table {
                let once = canonical_register(isa, alias);
                let twice = canonical_register(isa, &once);
                assert_eq!(once, twice, "{isa} {alias}");
            }
        }
    }
}
