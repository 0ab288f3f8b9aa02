// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Turns a decoded mnemonic's text into capability bits, and the
//! capability bits into the successor offsets a [`crate::matcher`]
//! needs to keep walking forward.

/// Capability bits derived from one decoded instruction.  Enough to
/// compute where control flow goes next without re-parsing the
/// mnemonic text a second time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionFlags {
    pub is_nop: bool,
    pub is_halt: bool,
    pub is_return: bool,
    pub is_jump_unconditional: bool,
    pub is_jump_conditional: bool,
    pub is_call: bool,
    pub size_in_bytes: usize,
    pub original_text: String,
}

const CONDITIONAL_JUMPS: &[&str] = &[
    "ja", "jae", "jb", "jbe", "jc", "jcxz", "je", "jecxz", "jg", "jge", "jl", "jle", "jna", "jnae",
    "jnb", "jnbe", "jnc", "jne", "jng", "jnge", "jnl", "jnle", "jno", "jnp", "jns", "jnz", "jo",
    "jp", "jpe", "jpo", "jrcxz", "js", "jz",
];

/// Extract the bare mnemonic (first whitespace-delimited token,
/// lower-cased) from a decoder's `mnemonic_text`, which may carry
/// operands (`mov %eax,0x0`) or a REX/segment prefix already folded
/// in by the decoder.
fn bare_mnemonic(text: &str) -> String {
    text.split_whitespace().next().unwrap_or("").to_ascii_lowercase()
}

/// Classify a decoded instruction from its mnemonic text and size.
pub fn classify(mnemonic_text: &str, size_in_bytes: usize) -> InstructionFlags {
    let mnemonic = bare_mnemonic(mnemonic_text);
    InstructionFlags {
        is_nop: mnemonic == "nop",
        is_halt: mnemonic == "hlt",
        is_return: mnemonic == "ret" || mnemonic == "retn" || mnemonic == "retf",
        is_jump_unconditional: mnemonic == "jmp",
        is_jump_conditional: CONDITIONAL_JUMPS.contains(&mnemonic.as_str()),
        is_call: mnemonic == "call",
        size_in_bytes,
        original_text: mnemonic_text.to_string(),
    }
}

/// Parse a jump/call's target operand out of its text, when the
/// decoder rendered it as a bare hex/decimal address (the common case
/// for direct near branches). Indirect operands (`*%rax`, `[rax]`)
/// yield `None`: the target is unknown until runtime, which is
/// exactly the case aggressive root search exists for.
pub fn branch_target(mnemonic_text: &str) -> Option<u64> {
    let operand = mnemonic_text.split_whitespace().nth(1)?;
    let token = operand.split(['<', ' ']).next()?.trim();
    if let Some(hex) = token.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        token.parse::<u64>().ok()
    }
}

/// The successor virtual addresses of a decoded instruction, per the
/// fixed rules: unconditional jump has its target only (if known);
/// conditional jump has target (if known) plus fall-through; call has
/// fall-through only; return/halt have none; anything else has
/// fall-through only.
pub fn successors(flags: &InstructionFlags, at_virtual: u64) -> Vec<u64> {
    let fallthrough = at_virtual + flags.size_in_bytes as u64;
    let target = branch_target(&flags.original_text);

    if flags.is_return || flags.is_halt {
        Vec::new()
    } else if flags.is_jump_unconditional {
        target.into_iter().collect()
    } else if flags.is_jump_conditional {
        let mut out = Vec::new();
        if let Some(t) = target {
            out.push(t);
        }
        out.push(fallthrough);
        out
    } else {
        vec![fallthrough]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_return_and_nop() {
        let f = classify("ret", 1);
        assert!(f.is_return);
        let f = classify("nop", 1);
        assert!(f.is_nop);
    }

    #[test]
    fn classifies_conditional_jump() {
        let f = classify("jne    10 <foo+0x10>", 2);
        assert!(f.is_jump_conditional);
        assert!(!f.is_jump_unconditional);
    }

    #[test]
    fn ordinary_instruction_has_fallthrough_only() {
        let f = classify("mov    %eax,0x0", 5);
        let succ = successors(&f, 0x1000);
        assert_eq!(succ, vec![0x1005]);
    }

    #[test]
    fn conditional_jump_has_target_and_fallthrough() {
        let f = classify("jne    0x2000", 2);
        let succ = successors(&f, 0x1000);
        assert_eq!(succ, vec![0x2000, 0x1002]);
    }

    #[test]
    fn call_has_fallthrough_only() {
        let f = classify("call   0x5000", 5);
        let succ = successors(&f, 0x1000);
        assert_eq!(succ, vec![0x1005]);
    }

    #[test]
    fn return_has_no_successors() {
        let f = classify("ret", 1);
        assert!(successors(&f, 0x1000).is_empty());
    }

    #[test]
    fn indirect_jump_target_unknown() {
        let f = classify("jmp    *%rax", 2);
        assert!(successors(&f, 0x1000).is_empty());
    }
}
