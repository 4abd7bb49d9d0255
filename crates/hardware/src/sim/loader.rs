//! ELF loading.
//!
//! Guest programs are RISC-V 32-bit little-endian ELF executables linked
//! against the fixed address map: text in [0x80000000, 0x80400000), data in
//! [0x80400000, 0x80800000). Sections are classified by address; NOBITS
//! sections (`.bss`) occupy their range zero-filled. Anything outside both
//! regions (debug info, symbol tables) is ignored.

use std::fs;
use std::path::Path;

use object::{Architecture, Object, ObjectSection, SectionKind};
use tracing::debug;

use crate::common::constants::{
    DATA_MEM_BASE, DATA_MEM_SIZE, INST_MEM_BASE, INST_MEM_SIZE,
};
use crate::common::SimError;

/// A loaded guest program: word images for both regions plus the entry
/// point. The vectors are trimmed to the last populated word.
pub struct ProgramImage {
    /// Instruction words, region-relative from `INST_MEM_BASE`.
    pub text: Vec<u32>,
    /// Data words, region-relative from `DATA_MEM_BASE`.
    pub data: Vec<u32>,
    /// Entry program counter.
    pub entry: u32,
}

/// Reads and parses the ELF at `path`.
pub fn load_elf(path: &Path) -> Result<ProgramImage, SimError> {
    let bytes = fs::read(path)?;
    parse_elf(&bytes)
}

/// Parses an ELF from memory.
pub fn parse_elf(bytes: &[u8]) -> Result<ProgramImage, SimError> {
    let file = object::File::parse(bytes)?;
    if file.architecture() != Architecture::Riscv32 {
        return Err(SimError::WrongMachine(format!(
            "{:?}",
            file.architecture()
        )));
    }
    if !file.is_little_endian() {
        return Err(SimError::WrongMachine("big-endian".to_string()));
    }

    let mut text_bytes: Vec<u8> = Vec::new();
    let mut data_bytes: Vec<u8> = Vec::new();

    for section in file.sections() {
        let addr = section.address() as u32;
        let size = section.size() as usize;
        if size == 0 {
            continue;
        }
        let (base, limit, image) = if (INST_MEM_BASE..INST_MEM_BASE + INST_MEM_SIZE)
            .contains(&addr)
        {
            (INST_MEM_BASE, INST_MEM_SIZE as usize, &mut text_bytes)
        } else if (DATA_MEM_BASE..DATA_MEM_BASE + DATA_MEM_SIZE).contains(&addr) {
            (DATA_MEM_BASE, DATA_MEM_SIZE as usize, &mut data_bytes)
        } else {
            continue;
        };

        let offset = (addr - base) as usize;
        let end = offset + size;
        if end > limit {
            return Err(SimError::BadImage(format!(
                "section {} overruns its region ({addr:#010x} + {size:#x})",
                section.name().unwrap_or("?")
            )));
        }
        if image.len() < end {
            image.resize(end, 0);
        }
        // NOBITS sections carry no file data; their range stays zero.
        if !matches!(
            section.kind(),
            SectionKind::UninitializedData
        ) {
            let contents = section.data()?;
            image[offset..offset + contents.len()].copy_from_slice(contents);
        }
        debug!(
            name = section.name().unwrap_or("?"),
            addr, size, "loaded section"
        );
    }

    Ok(ProgramImage {
        text: to_words(&text_bytes),
        data: to_words(&data_bytes),
        entry: file.entry() as u32,
    })
}

/// Packs a little-endian byte image into words, padding the tail.
fn to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-assembles a minimal ELF32 executable with the given sections.
    /// Each section: (name offset in shstrtab, sh_type, address, contents
    /// or a bare size for NOBITS).
    struct ElfBuilder {
        machine: u16,
        entry: u32,
        sections: Vec<(u32, u32, u32, Result<Vec<u8>, u32>)>,
        names: Vec<u8>,
    }

    const SHT_PROGBITS: u32 = 1;
    const SHT_STRTAB: u32 = 3;
    const SHT_NOBITS: u32 = 8;
    const EM_RISCV: u16 = 243;

    impl ElfBuilder {
        fn new() -> Self {
            Self {
                machine: EM_RISCV,
                entry: 0x8000_0000,
                sections: Vec::new(),
                names: vec![0],
            }
        }

        fn section(mut self, name: &str, addr: u32, contents: Vec<u8>) -> Self {
            let name_off = self.names.len() as u32;
            self.names.extend_from_slice(name.as_bytes());
            self.names.push(0);
            self.sections.push((name_off, SHT_PROGBITS, addr, Ok(contents)));
            self
        }

        fn nobits(mut self, name: &str, addr: u32, size: u32) -> Self {
            let name_off = self.names.len() as u32;
            self.names.extend_from_slice(name.as_bytes());
            self.names.push(0);
            self.sections.push((name_off, SHT_NOBITS, addr, Err(size)));
            self
        }

        fn build(mut self) -> Vec<u8> {
            let shstrtab_name = self.names.len() as u32;
            self.names.extend_from_slice(b".shstrtab\0");

            let shnum = self.sections.len() + 2; // null + shstrtab
            let shoff = 52;
            let mut contents_off = shoff + 40 * shnum;

            let mut out = Vec::new();
            out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1]);
            out.resize(16, 0);
            push16(&mut out, 2); // ET_EXEC
            push16(&mut out, self.machine);
            push32(&mut out, 1);
            push32(&mut out, self.entry);
            push32(&mut out, 0); // e_phoff
            push32(&mut out, shoff as u32);
            push32(&mut out, 0); // e_flags
            push16(&mut out, 52);
            push16(&mut out, 32);
            push16(&mut out, 0); // e_phnum
            push16(&mut out, 40);
            push16(&mut out, shnum as u16);
            push16(&mut out, (shnum - 1) as u16); // shstrndx

            let mut bodies = Vec::new();
            out.extend_from_slice(&[0u8; 40]); // null section header
            for (name, sh_type, addr, contents) in &self.sections {
                let (size, file_size) = match contents {
                    Ok(data) => (data.len() as u32, data.len()),
                    Err(size) => (*size, 0),
                };
                push_shdr(&mut out, *name, *sh_type, *addr, contents_off as u32, size);
                if let Ok(data) = contents {
                    bodies.extend_from_slice(data);
                }
                contents_off += file_size;
            }
            push_shdr(
                &mut out,
                shstrtab_name,
                SHT_STRTAB,
                0,
                contents_off as u32,
                self.names.len() as u32,
            );
            out.extend_from_slice(&bodies);
            out.extend_from_slice(&self.names);
            out
        }
    }

    fn push16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    fn push32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    fn push_shdr(out: &mut Vec<u8>, name: u32, sh_type: u32, addr: u32, offset: u32, size: u32) {
        // SHF_ALLOC | SHF_WRITE for allocated sections, none otherwise.
        let flags = if addr == 0 { 0 } else { 0x3 };
        push32(out, name);
        push32(out, sh_type);
        push32(out, flags);
        push32(out, addr);
        push32(out, offset);
        push32(out, size);
        push32(out, 0); // link
        push32(out, 0); // info
        push32(out, 4); // addralign
        push32(out, 0); // entsize
    }

    #[test]
    fn loads_text_data_and_bss() {
        let elf = ElfBuilder::new()
            .section(
                ".text",
                0x8000_0000,
                [0x93u8, 0x00, 0x50, 0x00, 0x0B, 0, 0, 0].to_vec(),
            )
            .section(".data", 0x8040_0000, 0xDEAD_BEEFu32.to_le_bytes().to_vec())
            .nobits(".bss", 0x8040_0004, 8)
            .build();

        let image = parse_elf(&elf).unwrap();
        assert_eq!(image.entry, 0x8000_0000);
        assert_eq!(image.text, vec![0x0050_0093, 0x0000_000B]);
        assert_eq!(image.data, vec![0xDEAD_BEEF, 0, 0]);
    }

    #[test]
    fn loads_from_a_file_on_disk() {
        let elf = ElfBuilder::new()
            .section(".text", 0x8000_0000, vec![0x13, 0, 0, 0])
            .build();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guest.elf");
        std::fs::write(&path, &elf).unwrap();

        let image = load_elf(&path).unwrap();
        assert_eq!(image.text, vec![0x13]);
        assert!(matches!(
            load_elf(&dir.path().join("missing.elf")),
            Err(SimError::Io(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_elf(b"not an elf at all"),
            Err(SimError::Elf(_))
        ));
    }

    #[test]
    fn rejects_wrong_machine() {
        let mut builder = ElfBuilder::new();
        builder.machine = 62; // x86-64
        let elf = builder
            .section(".text", 0x8000_0000, vec![0; 4])
            .build();
        assert!(matches!(
            parse_elf(&elf),
            Err(SimError::WrongMachine(_))
        ));
    }

    #[test]
    fn rejects_region_overrun() {
        let elf = ElfBuilder::new()
            .section(".data", 0x807F_FFFC, vec![0; 16])
            .build();
        assert!(matches!(parse_elf(&elf), Err(SimError::BadImage(_))));
    }

    #[test]
    fn ignores_unmapped_sections() {
        let elf = ElfBuilder::new()
            .section(".text", 0x8000_0000, vec![0x13, 0, 0, 0])
            .section(".comment", 0, b"debug junk".to_vec())
            .build();
        let image = parse_elf(&elf).unwrap();
        assert_eq!(image.text.len(), 1);
        assert!(image.data.is_empty());
    }
}
