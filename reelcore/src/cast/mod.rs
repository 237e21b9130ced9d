//! Cast-library manager: owns every `CastLib` (internal and external),
//! resolves members and handlers, and drives the external-cast fetch
//! lifecycle.

use crate::{
    container,
    error::{Error, Result},
    resources::{
        self,
        cast_list::{CastListEntry, Preload},
        cast_member::{MemberKind, CastMember as DecodedCastMember},
        key_table::KeyEntry,
        script::Script,
        script_names::NameTable,
    },
    value::{NormalizedString, Symbol},
    vm::HandlerLocation,
};
use bitflags::bitflags;
use std::{collections::HashMap, rc::Rc};
use unicase::UniCase;

bitflags! {
    /// Tracks which bulk operations have touched a `Manager` since it was
    /// last inspected, so a caller driving incremental saves/reloads can
    /// tell whether anything changed without diffing the whole registry.
    #[derive(Default)]
    pub struct ModifiedFlags: u8 {
        const ADDED_CAST    = 1;
        const MODIFIED_CAST = 2;
    }
}

/// Identifies a script chunk within a cast library. Reuses the
/// `castLib`-scoped addressing shape of a cast-member reference, but the
/// second field is a chunk id rather than a 1-indexed member number.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ScriptRef {
    pub cast_lib: u16,
    pub script_id: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExternalState {
    Declared,
    Fetching,
    Fetched,
    Parsed,
    Loaded,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct CastMember {
    pub number: u16,
    pub id: u32,
    pub name: String,
    pub kind: MemberKind,
    pub script_id: Option<u32>,
}

pub struct CastLib {
    pub number: u16,
    pub name: String,
    pub is_external: bool,
    pub file_name: Option<String>,
    pub preload_mode: Preload,
    pub external_state: ExternalState,
    pub scripts: HashMap<u32, Rc<Script>>,
    pub members: HashMap<u16, CastMember>,
    member_names: HashMap<NormalizedString, u16>,
    name_table: NameTable,
}

impl CastLib {
    fn new(number: u16, entry: &CastListEntry) -> Self {
        let is_external = entry.path.is_some();
        Self {
            number,
            name: entry.name.clone(),
            is_external,
            file_name: entry.path.clone(),
            preload_mode: entry.preload,
            external_state: if is_external { ExternalState::Declared } else { ExternalState::Loaded },
            scripts: HashMap::new(),
            members: HashMap::new(),
            member_names: HashMap::new(),
            name_table: NameTable::default(),
        }
    }

    fn install_member(&mut self, member: CastMember) {
        self.member_names.insert(UniCase::new(member.name.clone()), member.number);
        self.members.insert(member.number, member);
    }
}

#[derive(Default)]
pub struct Manager {
    castlibs: HashMap<u16, CastLib>,
    order: Vec<u16>,
    modified: ModifiedFlags,
}

impl Manager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags set by bulk operations (`install_internal`, `on_fetched`)
    /// since the manager was created; cleared by `clear_modified`.
    #[must_use]
    pub fn modified(&self) -> ModifiedFlags {
        self.modified
    }

    pub fn clear_modified(&mut self) {
        self.modified = ModifiedFlags::empty();
    }

    /// Installs the internal cast library (number 1) decoded from the
    /// movie's own container, plus a `Declared` placeholder for every
    /// external cast named in the cast list.
    pub fn install_internal(&mut self, index: &container::ContainerIndex, cast_list: &[CastListEntry]) -> Result<()> {
        for (i, entry) in cast_list.iter().enumerate() {
            let number = (i + 1) as u16;
            let mut lib = CastLib::new(number, entry);
            if !lib.is_external {
                self.populate_from_container(&mut lib, index)?;
            }
            self.order.push(number);
            self.castlibs.insert(number, lib);
            self.modified.insert(ModifiedFlags::ADDED_CAST);
        }
        Ok(())
    }

    fn populate_from_container(&self, lib: &mut CastLib, index: &container::ContainerIndex) -> Result<()> {
        let key_entries: Vec<KeyEntry> = index
            .first_of_kind(crate::platform::OsType::new(*b"KEY*"))
            .map(|chunk| resources::key_table::decode(&chunk.bytes()?))
            .transpose()?
            .unwrap_or_default();

        for chunk in index.all_of_kind(crate::platform::OsType::new(*b"CASt")) {
            let decoded: DecodedCastMember = resources::cast_member::decode(&chunk.bytes()?)?;
            let script_id = if decoded.kind == MemberKind::Script {
                resources::key_table::find_child(&key_entries, chunk.id, crate::platform::OsType::new(*b"Lscr"))
            } else {
                None
            };
            lib.install_member(CastMember {
                number: decoded.number,
                id: decoded.id,
                name: decoded.name,
                kind: decoded.kind,
                script_id,
            });
        }

        for chunk in index.all_of_kind(crate::platform::OsType::new(*b"Lscr")) {
            let script = resources::script::decode(&chunk.bytes()?)?;
            lib.scripts.insert(chunk.id, Rc::new(script));
        }

        if let Some(chunk) = index.first_of_kind(crate::platform::OsType::new(*b"Lnam")) {
            lib.name_table = resources::script_names::decode(&chunk.bytes()?)?;
        }

        Ok(())
    }

    #[must_use]
    pub fn castlib_by_number(&self, n: u16) -> Option<&CastLib> {
        self.castlibs.get(&n)
    }

    #[must_use]
    pub fn castlib_by_name(&self, name: &str) -> Option<&CastLib> {
        let needle = UniCase::new(name);
        self.order.iter().filter_map(|n| self.castlibs.get(n)).find(|lib| UniCase::new(lib.name.as_str()) == needle)
    }

    #[must_use]
    pub fn member(&self, cast_lib: u16, number: u16) -> Option<&CastMember> {
        self.castlibs.get(&cast_lib)?.members.get(&number)
    }

    #[must_use]
    pub fn member_by_name(&self, cast_lib: u16, name: &str) -> Option<&CastMember> {
        let lib = self.castlibs.get(&cast_lib)?;
        let number = lib.member_names.get(&UniCase::new(name))?;
        lib.members.get(number)
    }

    #[must_use]
    pub fn script(&self, script_ref: ScriptRef) -> Option<Rc<Script>> {
        self.castlibs.get(&script_ref.cast_lib)?.scripts.get(&script_ref.script_id).cloned()
    }

    #[must_use]
    pub fn resolve_name(&self, script_ref: ScriptRef, name_id: u32) -> Option<Symbol> {
        self.castlibs.get(&script_ref.cast_lib)?.name_table.get(name_id).map(Symbol::new)
    }

    /// Looks up a script chunk by the name its cast assigned it (used to
    /// resolve `NEW(name_id)`'s parent-script reference), searching cast
    /// libraries in declared order.
    #[must_use]
    pub fn script_ref_by_name(&self, name: &Symbol) -> Option<ScriptRef> {
        for &number in &self.order {
            let lib = self.castlibs.get(&number)?;
            if let Some(member) = lib.members.values().find(|m| UniCase::new(m.name.as_str()) == UniCase::new(name.as_str())) {
                if let Some(script_id) = member.script_id {
                    return Some(ScriptRef { cast_lib: number, script_id });
                }
            }
        }
        None
    }

    /// Searches cast libraries in declared order, scripts within a cast
    /// in chunk-id order, for the first handler named `name`.
    /// Handler-name matching is case-insensitive.
    #[must_use]
    pub fn find_handler(&self, name: &Symbol) -> Option<HandlerLocation> {
        for &number in &self.order {
            let lib = self.castlibs.get(&number)?;
            let mut script_ids: Vec<_> = lib.scripts.keys().copied().collect();
            script_ids.sort_unstable();
            for script_id in script_ids {
                let script_ref = ScriptRef { cast_lib: number, script_id };
                if let Some(handler_index) = self.find_handler_in_script(script_ref, name) {
                    return Some(HandlerLocation { script: script_ref, handler_index });
                }
            }
        }
        None
    }

    #[must_use]
    pub fn find_handler_in_script(&self, script_ref: ScriptRef, name: &Symbol) -> Option<usize> {
        let lib = self.castlibs.get(&script_ref.cast_lib)?;
        let script = lib.scripts.get(&script_ref.script_id)?;
        script
            .handlers
            .iter()
            .position(|h| lib.name_table.get(h.name_id).map(Symbol::new).as_ref() == Some(name))
    }

    #[must_use]
    pub fn find_handler_in_script_at(&self, cast_lib: u16, member: u16, name: &Symbol) -> Option<HandlerLocation> {
        let script_id = self.member(cast_lib, member)?.script_id?;
        let script_ref = ScriptRef { cast_lib, script_id };
        let handler_index = self.find_handler_in_script(script_ref, name)?;
        Some(HandlerLocation { script: script_ref, handler_index })
    }

    /// Enqueues fetches for every external cast whose preload setting is
    /// not `WhenNeeded`. Returns the number of fetches started; callers
    /// drive the actual state transitions via `begin_fetch`/`on_fetched`.
    pub fn preload_all_externals(&mut self) -> usize {
        let mut count = 0;
        for number in self.order.clone() {
            let lib = self.castlibs.get_mut(&number).unwrap();
            if lib.is_external && lib.preload_mode != Preload::WhenNeeded && lib.external_state == ExternalState::Declared {
                lib.external_state = ExternalState::Fetching;
                count += 1;
            }
        }
        count
    }

    /// `Fetching → Fetched`, called when the fetcher collaborator reports
    /// bytes for an external cast's number.
    pub fn on_fetched(&mut self, cast_number: u16, bytes: &[u8]) -> Result<()> {
        let mut lib = self.castlibs.remove(&cast_number).ok_or(Error::BadFormat)?;
        lib.external_state = ExternalState::Fetched;

        let result = self.finish_loading_external(&mut lib, bytes);
        if let Err(err) = &result {
            lib.external_state = ExternalState::Failed(err.to_string());
        }
        self.castlibs.insert(cast_number, lib);
        self.modified.insert(ModifiedFlags::MODIFIED_CAST);
        result
    }

    fn finish_loading_external(&self, lib: &mut CastLib, bytes: &[u8]) -> Result<()> {
        let index = container::load(bytes)?;
        lib.external_state = ExternalState::Parsed;
        self.populate_from_container(lib, &index)?;
        lib.external_state = ExternalState::Loaded;
        Ok(())
    }
}

#[cfg(test)]
impl Manager {
    /// Installs a cast library with hand-built scripts, bypassing the
    /// container-decoding path. Used by VM/cast tests that need specific
    /// handlers without constructing a whole movie byte blob.
    pub(crate) fn install_test_library(&mut self, number: u16, name_table: resources::script_names::NameTable, scripts: HashMap<u32, Rc<Script>>) {
        self.castlibs.insert(
            number,
            CastLib {
                number,
                name: String::new(),
                is_external: false,
                file_name: None,
                preload_mode: Preload::WhenNeeded,
                external_state: ExternalState::Loaded,
                scripts,
                members: HashMap::new(),
                member_names: HashMap::new(),
                name_table,
            },
        );
        self.order.push(number);
    }

    /// Installs a member that resolves to `script_id` within a library
    /// already added by `install_test_library`.
    pub(crate) fn install_test_member(&mut self, cast_lib: u16, number: u16, script_id: u32) {
        let lib = self.castlibs.get_mut(&cast_lib).expect("cast lib must exist");
        lib.install_member(CastMember { number, id: u32::from(number), name: String::new(), kind: MemberKind::Script, script_id: Some(script_id) });
    }

    /// Like `install_test_member`, but with a member name set so
    /// `script_ref_by_name` (used by `new`) can find it.
    pub(crate) fn install_test_named_member(&mut self, cast_lib: u16, number: u16, name: &str, script_id: u32) {
        let lib = self.castlibs.get_mut(&cast_lib).expect("cast lib must exist");
        lib.install_member(CastMember {
            number,
            id: u32::from(number),
            name: name.to_string(),
            kind: MemberKind::Script,
            script_id: Some(script_id),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};

    fn write_str16(out: &mut Vec<u8>, s: &str) {
        out.write_u16::<BigEndian>(s.len() as u16).unwrap();
        out.extend_from_slice(s.as_bytes());
    }

    fn build_container(entries: &[(u32, [u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFX");
        out.write_u32::<BigEndian>(0).unwrap(); // total_size, unchecked by the loader
        out.write_u32::<BigEndian>(entries.len() as u32).unwrap();

        let header_len = 12 + entries.len() * 16;
        let mut offset = header_len as u32;
        let mut offsets = Vec::with_capacity(entries.len());
        for (_, _, payload) in entries {
            offsets.push(offset);
            offset += payload.len() as u32;
        }

        for (i, (id, kind, payload)) in entries.iter().enumerate() {
            out.write_u32::<BigEndian>(*id).unwrap();
            out.extend_from_slice(kind);
            out.write_u32::<BigEndian>(offsets[i]).unwrap();
            out.write_u32::<BigEndian>(payload.len() as u32).unwrap();
        }
        for (_, _, payload) in entries {
            out.extend_from_slice(payload);
        }
        out
    }

    /// Scenario: an external cast fetched at runtime is decoded the same
    /// way the internal cast is, and its script handlers become resolvable
    /// once loaded.
    #[test]
    fn on_fetched_decodes_and_resolves_an_external_script_member() {
        let mut cast_payload = Vec::new();
        cast_payload.write_u16::<BigEndian>(7).unwrap(); // member number
        cast_payload.write_u32::<BigEndian>(700).unwrap(); // member id
        cast_payload.write_u16::<BigEndian>(11).unwrap(); // kind = Script
        write_str16(&mut cast_payload, "ExtUtil");

        let mut script_payload = Vec::new();
        script_payload.write_u16::<BigEndian>(7).unwrap(); // kind = Parent
        script_payload.write_u16::<BigEndian>(0).unwrap(); // property count
        script_payload.write_u16::<BigEndian>(0).unwrap(); // global count
        script_payload.write_u16::<BigEndian>(0).unwrap(); // literal count
        script_payload.write_u16::<BigEndian>(1).unwrap(); // handler count
        script_payload.write_u32::<BigEndian>(0).unwrap(); // handler name_id = 0 ("ping")
        script_payload.write_u16::<BigEndian>(0).unwrap(); // argc
        script_payload.write_u16::<BigEndian>(0).unwrap(); // local count
        let code = [0x40u8, 42, 0x16]; // PushInt 42; Ret
        script_payload.write_u32::<BigEndian>(code.len() as u32).unwrap();
        script_payload.extend_from_slice(&code);

        let mut names_payload = Vec::new();
        names_payload.write_u32::<BigEndian>(1).unwrap();
        write_str16(&mut names_payload, "ping");

        let mut key_payload = Vec::new();
        key_payload.write_u32::<BigEndian>(1).unwrap(); // entry count
        key_payload.write_u32::<BigEndian>(2).unwrap(); // owner: the CASt chunk's id
        key_payload.write_u32::<BigEndian>(3).unwrap(); // child: the Lscr chunk's id
        key_payload.extend_from_slice(b"Lscr");

        let bytes = build_container(&[
            (1, *b"KEY*", key_payload),
            (2, *b"CASt", cast_payload),
            (3, *b"Lscr", script_payload),
            (4, *b"Lnam", names_payload),
        ]);

        let mut manager = Manager::new();
        manager.install_test_library(9, NameTable::default(), HashMap::new());

        manager.on_fetched(9, &bytes).expect("external cast decodes");

        let member = manager.member_by_name(9, "ExtUtil").expect("member present");
        assert_eq!(member.number, 7);

        let location = manager.find_handler_in_script_at(9, 7, &Symbol::new("ping")).expect("handler resolves");
        assert_eq!(location.script, ScriptRef { cast_lib: 9, script_id: 3 });
    }
}
