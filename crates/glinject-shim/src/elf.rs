//! Loaded-object symbol table walker.
//!
//! Finds a symbol in an already-loaded shared object by reading its dynamic
//! section in memory. Never goes through `dlsym`, which is what makes it
//! usable for locating `dlsym` itself.

#[cfg(not(target_pointer_width = "64"))]
compile_error!("the symbol table walker only reads ELF64 objects");

use libc::{c_char, c_void};
use std::ffi::CStr;

// ELF64 dynamic-section definitions. Only what the walker reads.
mod elf {
    pub const DT_NULL: i64 = 0;
    pub const DT_HASH: i64 = 4;
    pub const DT_STRTAB: i64 = 5;
    pub const DT_SYMTAB: i64 = 6;
    pub const DT_GNU_HASH: i64 = 0x6fff_fef5;

    pub const SHN_UNDEF: u16 = 0;
    pub const STT_FUNC: u8 = 2;

    #[repr(C)]
    #[derive(Clone, Copy)]
    #[allow(dead_code)]
    pub struct Elf64Sym {
        pub st_name: u32,
        pub st_info: u8,
        pub st_other: u8,
        pub st_shndx: u16,
        pub st_value: u64,
        pub st_size: u64,
    }

    impl Elf64Sym {
        pub fn st_type(&self) -> u8 {
            self.st_info & 0xf
        }
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct Elf64Dyn {
        pub d_tag: i64,
        pub d_val: u64,
    }
}

/// A shared object found in the process's link map.
#[derive(Debug)]
pub struct LoadedObject {
    pub path: String,
    base: usize,
    symtab: *const elf::Elf64Sym,
    strtab: *const c_char,
    nsyms: usize,
}

impl LoadedObject {
    /// First loaded object whose path matches `pattern` (`*` wildcards).
    pub fn find(pattern: &str) -> Option<Self> {
        struct Ctx<'a> {
            pattern: &'a str,
            found: Option<LoadedObject>,
        }

        unsafe extern "C" fn callback(
            info: *mut libc::dl_phdr_info,
            _size: libc::size_t,
            data: *mut c_void,
        ) -> libc::c_int {
            let ctx = &mut *(data as *mut Ctx);
            let info = &*info;
            if info.dlpi_name.is_null() || *info.dlpi_name == 0 {
                return 0;
            }
            let path = CStr::from_ptr(info.dlpi_name).to_string_lossy();
            if !matches_glob(ctx.pattern, &path) {
                return 0;
            }
            match LoadedObject::from_phdr_info(path.into_owned(), info) {
                Some(object) => {
                    ctx.found = Some(object);
                    1
                }
                None => 0,
            }
        }

        let mut ctx = Ctx {
            pattern,
            found: None,
        };
        unsafe {
            libc::dl_iterate_phdr(Some(callback), &mut ctx as *mut Ctx as *mut c_void);
        }
        ctx.found
    }

    unsafe fn from_phdr_info(path: String, info: &libc::dl_phdr_info) -> Option<Self> {
        let phdrs = std::slice::from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize);
        let dynamic = phdrs
            .iter()
            .find(|phdr| phdr.p_type == libc::PT_DYNAMIC)
            .map(|phdr| (info.dlpi_addr + phdr.p_vaddr) as *const elf::Elf64Dyn)?;

        let (mut symtab, mut strtab, mut hash, mut gnu_hash) = (0u64, 0u64, 0u64, 0u64);
        let mut entry = dynamic;
        while (*entry).d_tag != elf::DT_NULL {
            match (*entry).d_tag {
                elf::DT_SYMTAB => symtab = (*entry).d_val,
                elf::DT_STRTAB => strtab = (*entry).d_val,
                elf::DT_HASH => hash = (*entry).d_val,
                elf::DT_GNU_HASH => gnu_hash = (*entry).d_val,
                _ => {}
            }
            entry = entry.add(1);
        }
        if symtab == 0 || strtab == 0 {
            return None;
        }

        // ld.so relocates these entries for regular objects; the vDSO keeps file addresses.
        let base = info.dlpi_addr;
        let relocate = |value: u64| -> usize {
            if value > base {
                value as usize
            } else {
                (base + value) as usize
            }
        };

        let nsyms = if hash != 0 {
            // DT_HASH: nbucket, nchain, ...; nchain is the symbol count
            *(relocate(hash) as *const u32).add(1) as usize
        } else if gnu_hash != 0 {
            gnu_hash_nsyms(relocate(gnu_hash) as *const u32)
        } else {
            return None;
        };

        Some(Self {
            path,
            base: base as usize,
            symtab: relocate(symtab) as *const elf::Elf64Sym,
            strtab: relocate(strtab) as *const c_char,
            nsyms,
        })
    }

    /// Address of the defined function `name`, if the object exports one.
    pub fn find_symbol(&self, name: &str) -> Option<*mut c_void> {
        let wanted = name.as_bytes();
        (0..self.nsyms).find_map(|i| unsafe {
            let sym = &*self.symtab.add(i);
            if sym.st_shndx == elf::SHN_UNDEF
                || sym.st_value == 0
                || sym.st_name == 0
                || sym.st_type() != elf::STT_FUNC
            {
                return None;
            }
            let sym_name = CStr::from_ptr(self.strtab.add(sym.st_name as usize));
            (sym_name.to_bytes() == wanted).then(|| (self.base + sym.st_value as usize) as *mut c_void)
        })
    }
}

/// Symbol count of a GNU hash table: one past the last chain entry.
unsafe fn gnu_hash_nsyms(table: *const u32) -> usize {
    // nbuckets, symoffset, bloom_size, bloom_shift, u64 bloom[bloom_size], u32 buckets[nbuckets], u32 chains[]
    let nbuckets = *table as usize;
    let symoffset = *table.add(1);
    let bloom_size = *table.add(2) as usize;

    let buckets = table.add(4 + bloom_size * 2);
    let chains = buckets.add(nbuckets);

    let last_bucket = (0..nbuckets).map(|i| *buckets.add(i)).max().unwrap_or(0);
    if last_bucket < symoffset {
        return symoffset as usize;
    }

    let mut idx = last_bucket;
    while *chains.add((idx - symoffset) as usize) & 1 == 0 {
        idx += 1;
    }
    idx as usize + 1
}

/// Glob match where `*` matches any run of characters.
pub fn matches_glob(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if text.len() < first.len() + last.len() || !text.starts_with(first) || !text.ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}
