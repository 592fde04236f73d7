use std::sync::OnceLock;

use super::instruction_table::{FormatDef, INSTRUCTION_TABLE};

#[derive(Default)]
struct TrieNode {
    children: [Option<usize>; 2],
    /// Formats whose prefix ends at this node, most literal bits first.
    formats: Vec<&'static FormatDef>,
}

/// Binary trie over the format prefixes, descending from the most
/// significant bit of the instruction word.
pub struct DispatchTrie {
    nodes: Vec<TrieNode>,
}

impl DispatchTrie {
    pub fn new(table: &'static [FormatDef]) -> Self {
        let mut trie = Self {
            nodes: vec![TrieNode::default()],
        };
        for f in table {
            trie.insert(f);
        }
        for node in trie.nodes.iter_mut() {
            node.formats
                .sort_by_key(|f| std::cmp::Reverse(f.literal_bits()));
        }
        trie
    }

    fn insert(&mut self, format: &'static FormatDef) {
        let (prefix, len) = format.prefix();
        let mut node = 0;
        for i in (0..len).rev() {
            let bit = ((prefix >> i) & 1) as usize;
            node = match self.nodes[node].children[bit] {
                Some(n) => n,
                None => {
                    self.nodes.push(TrieNode::default());
                    let n = self.nodes.len() - 1;
                    self.nodes[node].children[bit] = Some(n);
                    n
                }
            };
        }
        self.nodes[node].formats.push(format);
    }

    /// Finds the most specific format matching the word.
    pub fn lookup(&self, word: u16) -> Option<&'static FormatDef> {
        if word == 0 {
            return None;
        }

        // Collect the nodes on the path of the word.
        let mut path = vec![0];
        let mut node = 0;
        for i in (0..16).rev() {
            let bit = ((word >> i) & 1) as usize;
            let Some(next) = self.nodes[node].children[bit] else {
                break;
            };
            path.push(next);
            node = next;
        }

        path.into_iter()
            .rev()
            .flat_map(|n| self.nodes[n].formats.iter())
            .find(|f| f.matches(word))
            .copied()
    }
}

/// Looks up the format of an instruction word in the instruction table.
pub fn dispatch(word: u16) -> Option<&'static FormatDef> {
    static TRIE: OnceLock<DispatchTrie> = OnceLock::new();
    TRIE.get_or_init(|| DispatchTrie::new(INSTRUCTION_TABLE))
        .lookup(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_m68k::instruction_table::InstructionType;

    fn dispatch_type(word: u16) -> Option<InstructionType> {
        dispatch(word).map(|f| f.instr_type)
    }

    #[test]
    fn zero_word() {
        assert_eq!(dispatch_type(0x0000), None);
    }

    #[test]
    fn no_match() {
        // LINE-A, LINE-F
        assert_eq!(dispatch_type(0xA000), None);
        assert_eq!(dispatch_type(0xF000), None);
        // ILLEGAL
        assert_eq!(dispatch_type(0x4AFC), None);
    }

    #[test]
    fn shared_prefix() {
        // MOVE.W D1,D0
        assert_eq!(dispatch_type(0x3001), Some(InstructionType::MOVE_W));
        // MOVEA.W D1,A0
        assert_eq!(dispatch_type(0x3041), Some(InstructionType::MOVEA_W));
        // MOVEA.L D1,A0
        assert_eq!(dispatch_type(0x2041), Some(InstructionType::MOVEA_L));
        // MOVE.B D1,D0
        assert_eq!(dispatch_type(0x1001), Some(InstructionType::MOVE_B));
        // ADD.W D1,D0
        assert_eq!(dispatch_type(0xD041), Some(InstructionType::ADD));
        // ADDA.W D1,A0
        assert_eq!(dispatch_type(0xD0C1), Some(InstructionType::ADDA));
        // ADDA.L D1,A0
        assert_eq!(dispatch_type(0xD1C1), Some(InstructionType::ADDA));
        // CMP.B D0,D1
        assert_eq!(dispatch_type(0xB200), Some(InstructionType::CMP));
        // EOR.B D0,D1
        assert_eq!(dispatch_type(0xB101), Some(InstructionType::EOR));
        // ADDQ / SUBQ
        assert_eq!(dispatch_type(0x5240), Some(InstructionType::ADDQ));
        assert_eq!(dispatch_type(0x5340), Some(InstructionType::SUBQ));
    }

    #[test]
    fn deepest_prefix_wins() {
        assert_eq!(dispatch_type(0x6004), Some(InstructionType::BCC));
        assert_eq!(dispatch_type(0x6704), Some(InstructionType::BCC));
        assert_eq!(dispatch_type(0x6104), Some(InstructionType::BSR));
        assert_eq!(dispatch_type(0x4E75), Some(InstructionType::RTS));
        assert_eq!(dispatch_type(0x4E71), Some(InstructionType::NOP));
        assert_eq!(dispatch_type(0x4E4F), Some(InstructionType::TRAP));
        assert_eq!(dispatch_type(0x4E90), Some(InstructionType::JSR));
        // LEA (A0),A1
        assert_eq!(dispatch_type(0x43D0), Some(InstructionType::LEA));
        // NEG.W D0
        assert_eq!(dispatch_type(0x4440), Some(InstructionType::NEG));
        // CMPI.B #x,D0
        assert_eq!(dispatch_type(0x0C00), Some(InstructionType::CMPI));
        assert_eq!(dispatch_type(0xFFFF), Some(InstructionType::SIMHALT));
    }

    /// Every word the trie resolves must be matched by that format, and
    /// no format with more literal bits may also match.
    #[test]
    fn exhaustive_consistency() {
        for word in 0..=u16::MAX {
            let found = dispatch(word);
            let best = INSTRUCTION_TABLE
                .iter()
                .filter(|f| f.matches(word))
                .max_by_key(|f| (f.prefix().1, f.literal_bits()));
            match (found, best) {
                (Some(f), Some(b)) => {
                    assert!(f.matches(word));
                    assert_eq!(f.instr_type, b.instr_type, "{:04X}", word);
                }
                (None, None) => (),
                (None, Some(_)) => assert_eq!(word, 0),
                (Some(f), None) => panic!("{:04X} dispatched to {}", word, f.mnemonic),
            }
        }
    }
}
