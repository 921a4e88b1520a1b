use std::collections::HashMap;
use std::fmt;

use wasmcodec_utils::IdAppendVec;
use wasmcodec_utils::NamedLookup;

use super::error::{Error, Result};
use super::features::Features;
use super::instructions::{Expr, RefMut};
use super::types::FuncType;
use super::types::GlobalType;
use super::types::MemType;
use super::types::Name;
use super::types::RefType;
use super::types::TableType;
use super::types::ValType;

/// Section ids as written on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SectionId {
    Custom,
    Type,
    Import,
    Function,
    Table,
    Memory,
    Global,
    Export,
    Start,
    Element,
    Code,
    Data,
    DataCount,
}

impl SectionId {
    /// Standard sections in the order they appear in a module.
    pub const ORDERED: [SectionId; 12] = [
        SectionId::Type,
        SectionId::Import,
        SectionId::Function,
        SectionId::Table,
        SectionId::Memory,
        SectionId::Global,
        SectionId::Export,
        SectionId::Start,
        SectionId::Element,
        SectionId::DataCount,
        SectionId::Code,
        SectionId::Data,
    ];

    pub fn code(self) -> u8 {
        match self {
            SectionId::Custom => 0,
            SectionId::Type => 1,
            SectionId::Import => 2,
            SectionId::Function => 3,
            SectionId::Table => 4,
            SectionId::Memory => 5,
            SectionId::Global => 6,
            SectionId::Export => 7,
            SectionId::Start => 8,
            SectionId::Element => 9,
            SectionId::Code => 10,
            SectionId::Data => 11,
            SectionId::DataCount => 12,
        }
    }

    pub fn from_code(code: u8) -> Option<SectionId> {
        if code == 0 {
            return Some(SectionId::Custom);
        }
        SectionId::ORDERED.iter().cloned().find(|id| id.code() == code)
    }

    fn rank(self) -> u32 {
        SectionId::ORDERED
            .iter()
            .position(|&id| id == self)
            .map(|p| p as u32 + 1)
            .unwrap_or(0)
    }

    /// Ordering key of a standard section. Custom sections are ordered by
    /// their `Placement` instead.
    pub fn precedence(self) -> u32 {
        self.rank() * 4 + 2
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Where a custom section goes relative to the standard sections.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Placement {
    Start,
    Before(SectionId),
    After(SectionId),
    End,
}

impl Default for Placement {
    fn default() -> Self {
        Placement::End
    }
}

impl Placement {
    /// Sorts right before or after the anchor's own key. Custom sections
    /// with the same placement keep their relative order.
    pub fn precedence(self) -> u32 {
        match self {
            Placement::Start => 0,
            Placement::Before(id) => id.precedence() - 1,
            Placement::After(id) => id.precedence() + 1,
            Placement::End => (SectionId::ORDERED.len() as u32 + 1) * 4,
        }
    }
}

/// What an entity reference points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// The import with this id.
    Import(u32),
    /// The entry with this id in the owning section.
    Local(u32),
    /// Not linked yet, see [`Module::link`].
    Named(Name),
}

macro_rules! entity_refs {
    ($($(#[$m:meta])* $name:ident;)*) => {$(
        $(#[$m])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub Target);

        impl $name {
            pub fn import(id: u32) -> Self {
                $name(Target::Import(id))
            }
            pub fn local(id: u32) -> Self {
                $name(Target::Local(id))
            }
            pub fn named(name: impl Into<Name>) -> Self {
                $name(Target::Named(name.into()))
            }
            pub fn target(&self) -> &Target {
                &self.0
            }
        }
    )*}
}

entity_refs! {
    FuncRef;
    TableRef;
    MemRef;
    GlobalRef;
    /// Element segments can not be imported, only `Local` and `Named` apply.
    ElemRef;
    /// Data segments can not be imported, only `Local` and `Named` apply.
    DataRef;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExternKind {
    Func,
    Table,
    Mem,
    Global,
}

impl fmt::Display for ExternKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ExternKind::Func => "function",
            ExternKind::Table => "table",
            ExternKind::Mem => "memory",
            ExternKind::Global => "global",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Import {
    pub module: Name,
    pub name: Name,
    pub desc: ImportDesc,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ImportDesc {
    Func(FuncType),
    Table(TableType),
    Mem(MemType),
    Global(GlobalType),
}

impl ImportDesc {
    pub fn kind(&self) -> ExternKind {
        match *self {
            ImportDesc::Func(_) => ExternKind::Func,
            ImportDesc::Table(_) => ExternKind::Table,
            ImportDesc::Mem(_) => ExternKind::Mem,
            ImportDesc::Global(_) => ExternKind::Global,
        }
    }
}

/// A function declared by the module, together with its body.
#[derive(Clone, Debug, PartialEq)]
pub struct Func {
    pub type_: FuncType,
    pub code: Code,
    /// Debug name, written to the `name` section.
    pub name: Option<Name>,
    /// Debug names of locals by local index, parameters included.
    pub local_names: Vec<(u32, Name)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub type_: TableType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mem {
    pub type_: MemType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub type_: GlobalType,
    pub init: Expr,
    /// Only used to link placeholders, not written.
    pub name: Option<Name>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Export {
    pub name: Name,
    pub desc: ExportDesc,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExportDesc {
    Func(FuncRef),
    Table(TableRef),
    Mem(MemRef),
    Global(GlobalRef),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElemMode {
    Passive,
    Declarative,
    Active { table: TableRef, offset: Expr },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElemItems {
    /// Function indices, always of type `funcref`.
    Funcs(Vec<FuncRef>),
    /// Constant expressions producing references of the given type.
    Exprs(RefType, Vec<Expr>),
}

impl ElemItems {
    pub fn ref_type(&self) -> RefType {
        match *self {
            ElemItems::Funcs(_) => RefType::FuncRef,
            ElemItems::Exprs(t, _) => t,
        }
    }

    pub fn len(&self) -> usize {
        match *self {
            ElemItems::Funcs(ref v) => v.len(),
            ElemItems::Exprs(_, ref v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Elem {
    pub mode: ElemMode,
    pub items: ElemItems,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DataMode {
    Passive,
    Active { mem: MemRef, offset: Expr },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Data {
    pub mode: DataMode,
    pub init: Vec<u8>,
}

/// Locals and body of one function.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Code {
    /// Declared locals, one entry per local, excluding parameters.
    pub locals: Vec<ValType>,
    pub body: Expr,
}

/// A subsection of the `name` section that is carried through unread.
#[derive(Clone, Debug, PartialEq)]
pub struct NameSubsection {
    pub id: u8,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CustomSection {
    pub name: Name,
    pub payload: Vec<u8>,
    pub placement: Placement,
}

/// Function types, referenced structurally from everywhere else.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TypeSection {
    types: Vec<FuncType>,
}

impl TypeSection {
    /// The index of a structurally equal type, appending `ft` if there is
    /// none yet.
    pub fn intern(&mut self, ft: FuncType) -> u32 {
        match self.index_of(&ft) {
            Some(i) => i,
            None => {
                self.types.push(ft);
                self.types.len() as u32 - 1
            }
        }
    }

    /// Appends `ft` even if it is already present.
    pub fn push(&mut self, ft: FuncType) -> u32 {
        self.types.push(ft);
        self.types.len() as u32 - 1
    }

    pub fn index_of(&self, ft: &FuncType) -> Option<u32> {
        self.types.iter().position(|t| t == ft).map(|i| i as u32)
    }

    pub fn resolve(&self, ft: &FuncType) -> Result<u32> {
        self.index_of(ft)
            .ok_or_else(|| Error::reference(format!("type {} is not in the type section", ft)))
    }

    pub fn get(&self, index: u32) -> Option<&FuncType> {
        self.types.get(index as usize)
    }

    pub fn lookup(&self, index: u32) -> Result<&FuncType> {
        let len = self.types.len();
        self.get(index)
            .ok_or_else(|| Error::reference(format!("type index {} out of range ({} types)", index, len)))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> ::std::slice::Iter<FuncType> {
        self.types.iter()
    }
}

impl From<Vec<FuncType>> for TypeSection {
    fn from(types: Vec<FuncType>) -> Self {
        TypeSection { types }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub version: u32,
    /// Module name from the `name` section.
    pub name: Option<Name>,
    /// The `name` subsections besides module, function and local names.
    pub name_subsections: Vec<NameSubsection>,
    pub types: TypeSection,
    pub imports: IdAppendVec<Import>,
    pub funcs: IdAppendVec<Func>,
    pub tables: IdAppendVec<Table>,
    pub mems: IdAppendVec<Mem>,
    pub globals: IdAppendVec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<FuncRef>,
    pub elems: IdAppendVec<Elem>,
    /// Written only if set; has to equal the number of data segments.
    pub data_count: Option<u32>,
    pub data: IdAppendVec<Data>,
    pub customs: Vec<CustomSection>,
}

impl Default for Module {
    fn default() -> Self {
        Module::new()
    }
}

impl Module {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Module {
            version: Module::VERSION,
            name: None,
            name_subsections: Vec::new(),
            types: TypeSection::default(),
            imports: IdAppendVec::new(),
            funcs: IdAppendVec::new(),
            tables: IdAppendVec::new(),
            mems: IdAppendVec::new(),
            globals: IdAppendVec::new(),
            exports: Vec::new(),
            start: None,
            elems: IdAppendVec::new(),
            data_count: None,
            data: IdAppendVec::new(),
            customs: Vec::new(),
        }
    }

    /// Declares a function with its body and returns the reference to it.
    pub fn add_func(&mut self, type_: FuncType, code: Code) -> FuncRef {
        FuncRef::local(self.funcs.append(Func {
            type_,
            code,
            name: None,
            local_names: Vec::new(),
        }))
    }

    pub fn add_import(&mut self, module: impl Into<Name>, name: impl Into<Name>, desc: ImportDesc) -> u32 {
        self.imports.append(Import {
            module: module.into(),
            name: name.into(),
            desc,
        })
    }

    fn imports_of(&self, kind: ExternKind) -> impl Iterator<Item = (u32, &Import)> + '_ {
        self.imports.iter().filter(move |(_, i)| i.desc.kind() == kind)
    }

    pub fn imported(&self, kind: ExternKind) -> usize {
        self.imports_of(kind).count()
    }

    fn index_of<T>(&self, kind: ExternKind, locals: &IdAppendVec<T>, target: &Target) -> Result<u32> {
        let found = match *target {
            Target::Import(id) => self.imports_of(kind).position(|(i, _)| i == id),
            Target::Local(id) => locals.position(id).map(|p| p + self.imported(kind)),
            Target::Named(ref name) => {
                return Err(Error::reference(format!("unlinked {} placeholder `{}`", kind, name)))
            }
        };
        found
            .map(|i| i as u32)
            .ok_or_else(|| Error::reference(format!("{} {:?} is not part of the module", kind, target)))
    }

    fn target_at<T>(&self, kind: ExternKind, locals: &IdAppendVec<T>, index: u32) -> Option<Target> {
        let index = index as usize;
        let imported = self.imported(kind);
        if index < imported {
            self.imports_of(kind).nth(index).map(|(id, _)| Target::Import(id))
        } else {
            locals.at(index - imported).map(|(id, _)| Target::Local(id))
        }
    }

    fn out_of_range(kind: &str, index: u32, len: usize) -> Error {
        Error::reference(format!("{} index {} out of range ({} defined)", kind, index, len))
    }

    pub fn func_index(&self, func: &FuncRef) -> Result<u32> {
        self.index_of(ExternKind::Func, &self.funcs, &func.0)
    }
    pub fn try_func_ref(&self, index: u32) -> Option<FuncRef> {
        self.target_at(ExternKind::Func, &self.funcs, index).map(FuncRef)
    }
    pub fn func_ref(&self, index: u32) -> Result<FuncRef> {
        self.try_func_ref(index)
            .ok_or_else(|| Module::out_of_range("function", index, self.func_count()))
    }
    pub fn func_count(&self) -> usize {
        self.imported(ExternKind::Func) + self.funcs.len()
    }

    pub fn table_index(&self, table: &TableRef) -> Result<u32> {
        self.index_of(ExternKind::Table, &self.tables, &table.0)
    }
    pub fn try_table_ref(&self, index: u32) -> Option<TableRef> {
        self.target_at(ExternKind::Table, &self.tables, index).map(TableRef)
    }
    pub fn table_ref(&self, index: u32) -> Result<TableRef> {
        self.try_table_ref(index)
            .ok_or_else(|| Module::out_of_range("table", index, self.table_count()))
    }
    pub fn table_count(&self) -> usize {
        self.imported(ExternKind::Table) + self.tables.len()
    }

    pub fn mem_index(&self, mem: &MemRef) -> Result<u32> {
        self.index_of(ExternKind::Mem, &self.mems, &mem.0)
    }
    pub fn try_mem_ref(&self, index: u32) -> Option<MemRef> {
        self.target_at(ExternKind::Mem, &self.mems, index).map(MemRef)
    }
    pub fn mem_ref(&self, index: u32) -> Result<MemRef> {
        self.try_mem_ref(index)
            .ok_or_else(|| Module::out_of_range("memory", index, self.mem_count()))
    }
    pub fn mem_count(&self) -> usize {
        self.imported(ExternKind::Mem) + self.mems.len()
    }

    pub fn global_index(&self, global: &GlobalRef) -> Result<u32> {
        self.index_of(ExternKind::Global, &self.globals, &global.0)
    }
    pub fn try_global_ref(&self, index: u32) -> Option<GlobalRef> {
        self.target_at(ExternKind::Global, &self.globals, index).map(GlobalRef)
    }
    pub fn global_ref(&self, index: u32) -> Result<GlobalRef> {
        self.try_global_ref(index)
            .ok_or_else(|| Module::out_of_range("global", index, self.global_count()))
    }
    pub fn global_count(&self) -> usize {
        self.imported(ExternKind::Global) + self.globals.len()
    }

    pub fn elem_index(&self, elem: &ElemRef) -> Result<u32> {
        match elem.0 {
            Target::Local(id) => self.elems.position(id).map(|p| p as u32).ok_or_else(|| {
                Error::reference(format!("element segment {} is not part of the module", id))
            }),
            ref target => Err(Error::reference(format!("element segment reference {:?}", target))),
        }
    }
    pub fn try_elem_ref(&self, index: u32) -> Option<ElemRef> {
        self.elems.at(index as usize).map(|(id, _)| ElemRef::local(id))
    }
    pub fn elem_ref(&self, index: u32) -> Result<ElemRef> {
        self.try_elem_ref(index)
            .ok_or_else(|| Module::out_of_range("element segment", index, self.elems.len()))
    }

    pub fn data_index(&self, data: &DataRef) -> Result<u32> {
        match data.0 {
            Target::Local(id) => self.data.position(id).map(|p| p as u32).ok_or_else(|| {
                Error::reference(format!("data segment {} is not part of the module", id))
            }),
            ref target => Err(Error::reference(format!("data segment reference {:?}", target))),
        }
    }
    pub fn try_data_ref(&self, index: u32) -> Option<DataRef> {
        self.data.at(index as usize).map(|(id, _)| DataRef::local(id))
    }
    pub fn data_ref(&self, index: u32) -> Result<DataRef> {
        self.try_data_ref(index)
            .ok_or_else(|| Module::out_of_range("data segment", index, self.data.len()))
    }

    fn dangling(what: &str, target: &Target) -> Error {
        Error::reference(format!("{} {:?} does not exist", what, target))
    }

    pub fn func_type(&self, func: &FuncRef) -> Result<&FuncType> {
        let found = match func.0 {
            Target::Import(id) => match self.imports.get(id).map(|i| &i.desc) {
                Some(ImportDesc::Func(ft)) => Some(ft),
                _ => None,
            },
            Target::Local(id) => self.funcs.get(id).map(|f| &f.type_),
            Target::Named(_) => None,
        };
        found.ok_or_else(|| Module::dangling("function", &func.0))
    }

    pub fn table_type(&self, table: &TableRef) -> Result<&TableType> {
        let found = match table.0 {
            Target::Import(id) => match self.imports.get(id).map(|i| &i.desc) {
                Some(ImportDesc::Table(tt)) => Some(tt),
                _ => None,
            },
            Target::Local(id) => self.tables.get(id).map(|t| &t.type_),
            Target::Named(_) => None,
        };
        found.ok_or_else(|| Module::dangling("table", &table.0))
    }

    pub fn mem_type(&self, mem: &MemRef) -> Result<&MemType> {
        let found = match mem.0 {
            Target::Import(id) => match self.imports.get(id).map(|i| &i.desc) {
                Some(ImportDesc::Mem(mt)) => Some(mt),
                _ => None,
            },
            Target::Local(id) => self.mems.get(id).map(|m| &m.type_),
            Target::Named(_) => None,
        };
        found.ok_or_else(|| Module::dangling("memory", &mem.0))
    }

    pub fn global_type(&self, global: &GlobalRef) -> Result<&GlobalType> {
        let found = match global.0 {
            Target::Import(id) => match self.imports.get(id).map(|i| &i.desc) {
                Some(ImportDesc::Global(gt)) => Some(gt),
                _ => None,
            },
            Target::Local(id) => self.globals.get(id).map(|g| &g.type_),
            Target::Named(_) => None,
        };
        found.ok_or_else(|| Module::dangling("global", &global.0))
    }

    fn exprs(&self) -> impl Iterator<Item = &Expr> + '_ {
        let bodies = self.funcs.values().map(|f| &f.code.body);
        let inits = self.globals.values().map(|g| &g.init);
        let elems = self.elems.values().flat_map(|e| {
            let offset = match e.mode {
                ElemMode::Active { ref offset, .. } => Some(offset),
                _ => None,
            };
            let items: &[Expr] = match e.items {
                ElemItems::Exprs(_, ref exprs) => exprs,
                ElemItems::Funcs(_) => &[],
            };
            offset.into_iter().chain(items)
        });
        let data = self.data.values().filter_map(|d| match d.mode {
            DataMode::Active { ref offset, .. } => Some(offset),
            DataMode::Passive => None,
        });
        bodies.chain(inits).chain(elems).chain(data)
    }

    fn exprs_mut(&mut self) -> impl Iterator<Item = &mut Expr> + '_ {
        let bodies = self.funcs.iter_mut().map(|(_, f)| &mut f.code.body);
        let inits = self.globals.iter_mut().map(|(_, g)| &mut g.init);
        let elems = self.elems.iter_mut().flat_map(|(_, e)| {
            let offset = match e.mode {
                ElemMode::Active { ref mut offset, .. } => Some(offset),
                _ => None,
            };
            let items: &mut [Expr] = match e.items {
                ElemItems::Exprs(_, ref mut exprs) => exprs,
                ElemItems::Funcs(_) => &mut [],
            };
            offset.into_iter().chain(items.iter_mut())
        });
        let data = self.data.iter_mut().filter_map(|(_, d)| match d.mode {
            DataMode::Active { ref mut offset, .. } => Some(offset),
            DataMode::Passive => None,
        });
        bodies.chain(inits).chain(elems).chain(data)
    }

    /// Adds every function type the module refers to to the type section.
    pub fn intern_types(&mut self) {
        let mut found = Vec::new();
        for import in self.imports.values() {
            if let ImportDesc::Func(ref ft) = import.desc {
                found.push(ft.clone());
            }
        }
        for func in self.funcs.values() {
            found.push(func.type_.clone());
        }
        for expr in self.exprs() {
            for instr in &expr.body {
                instr.visit_types(&mut |ft| found.push(ft.clone()));
            }
        }
        for ft in found {
            self.types.intern(ft);
        }
    }

    /// Checks the shape constraints of the index spaces.
    pub fn check_structure(&self, features: &Features) -> Result<()> {
        if !features.multi_table && self.table_count() > 1 {
            return Err(Error::structure(format!(
                "{} tables declared, multiple tables are not enabled",
                self.table_count()
            )));
        }
        if !features.multi_memory && self.mem_count() > 1 {
            return Err(Error::structure(format!(
                "{} memories declared, multiple memories are not enabled",
                self.mem_count()
            )));
        }
        Ok(())
    }

    /// Replaces every `Named` reference by the entity carrying that name.
    ///
    /// Names are looked up as debug names first, then as export names, then
    /// as import field names.
    pub fn link(&mut self) -> Result<()> {
        let names = Names::new(self);

        for expr in self.exprs_mut() {
            for instr in &mut expr.body {
                instr.visit_refs_mut(&mut |r| names.link(r))?;
            }
        }
        for export in &mut self.exports {
            match export.desc {
                ExportDesc::Func(ref mut r) => names.link(RefMut::Func(r))?,
                ExportDesc::Table(ref mut r) => names.link(RefMut::Table(r))?,
                ExportDesc::Mem(ref mut r) => names.link(RefMut::Mem(r))?,
                ExportDesc::Global(ref mut r) => names.link(RefMut::Global(r))?,
            }
        }
        if let Some(ref mut start) = self.start {
            names.link(RefMut::Func(start))?;
        }
        for (_, elem) in self.elems.iter_mut() {
            if let ElemMode::Active { ref mut table, .. } = elem.mode {
                names.link(RefMut::Table(table))?;
            }
            if let ElemItems::Funcs(ref mut funcs) = elem.items {
                for func in funcs {
                    names.link(RefMut::Func(func))?;
                }
            }
        }
        for (_, data) in self.data.iter_mut() {
            if let DataMode::Active { ref mut mem, .. } = data.mode {
                names.link(RefMut::Mem(mem))?;
            }
        }
        Ok(())
    }
}

/// Name tables of one module, earlier entries shadow later ones.
struct Names {
    tables: HashMap<ExternKind, Vec<(Name, Target)>>,
}

impl Names {
    fn new(module: &Module) -> Self {
        let mut tables: HashMap<ExternKind, Vec<(Name, Target)>> = HashMap::new();

        for (id, f) in module.funcs.iter() {
            if let Some(ref name) = f.name {
                tables.entry(ExternKind::Func).or_default().push((name.clone(), Target::Local(id)));
            }
        }
        for (id, g) in module.globals.iter() {
            if let Some(ref name) = g.name {
                tables.entry(ExternKind::Global).or_default().push((name.clone(), Target::Local(id)));
            }
        }
        for export in &module.exports {
            let (kind, target) = match export.desc {
                ExportDesc::Func(ref r) => (ExternKind::Func, &r.0),
                ExportDesc::Table(ref r) => (ExternKind::Table, &r.0),
                ExportDesc::Mem(ref r) => (ExternKind::Mem, &r.0),
                ExportDesc::Global(ref r) => (ExternKind::Global, &r.0),
            };
            if let Target::Named(_) = *target {
                continue;
            }
            tables.entry(kind).or_default().push((export.name.clone(), target.clone()));
        }
        for (id, import) in module.imports.iter() {
            tables
                .entry(import.desc.kind())
                .or_default()
                .push((import.name.clone(), Target::Import(id)));
        }

        Names { tables }
    }

    fn find(&self, kind: ExternKind, name: &str) -> Option<Target> {
        self.tables
            .get(&kind)?
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, t)| t.clone())
    }

    fn link(&self, r: RefMut) -> Result<()> {
        fn resolve<T, L>(names: &L, slot: &mut Target) -> Result<()>
        where
            L: NamedLookup<T>,
            T: Into<Target>,
        {
            if let Target::Named(ref name) = *slot {
                let target = names
                    .lookup(name)
                    .ok_or_else(|| Error::reference(format!("no entity named `{}`", name)))?;
                *slot = target.into();
            }
            Ok(())
        }

        match r {
            RefMut::Func(r) => resolve::<FuncRef, _>(self, &mut r.0),
            RefMut::Table(r) => resolve::<TableRef, _>(self, &mut r.0),
            RefMut::Mem(r) => resolve::<MemRef, _>(self, &mut r.0),
            RefMut::Global(r) => resolve::<GlobalRef, _>(self, &mut r.0),
            RefMut::Elem(r) => resolve::<ElemRef, _>(&NoNames, &mut r.0),
            RefMut::Data(r) => resolve::<DataRef, _>(&NoNames, &mut r.0),
        }
    }
}

/// Segments carry no names; every placeholder for them stays unresolved.
struct NoNames;

impl<T> NamedLookup<T> for NoNames {
    fn lookup(&self, _: &str) -> Option<T> {
        None
    }
}

macro_rules! named_lookup {
    ($($name:ident => $kind:ident,)*) => {$(
        impl NamedLookup<$name> for Names {
            fn lookup(&self, name: &str) -> Option<$name> {
                self.find(ExternKind::$kind, name).map($name)
            }
        }
    )*}
}

named_lookup! {
    FuncRef => Func,
    TableRef => Table,
    MemRef => Mem,
    GlobalRef => Global,
}

macro_rules! into_target {
    ($($name:ident)*) => {$(
        impl From<$name> for Target {
            fn from(r: $name) -> Target {
                r.0
            }
        }
    )*}
}

into_target!(FuncRef TableRef MemRef GlobalRef ElemRef DataRef);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::Instr;
    use crate::opcodes::SimpleOp;
    use crate::types::{Limits, Mut};

    fn unit() -> FuncType {
        FuncType::new(&[], &[])
    }

    #[test]
    fn index_space_counts_imports_first() {
        let mut m = Module::new();
        let imp = m.add_import("env", "f", ImportDesc::Func(unit()));
        m.add_import("env", "g", ImportDesc::Global(GlobalType { mutability: Mut::Const, valtype: ValType::I32 }));
        let local = m.add_func(unit(), Code::default());

        assert_eq!(m.func_index(&FuncRef::import(imp)), Ok(0));
        assert_eq!(m.func_index(&local), Ok(1));
        assert_eq!(m.func_ref(1), Ok(local));
        assert_eq!(m.try_func_ref(2), None);
        assert_eq!(m.func_ref(2).map_err(|e| e.kind()), Err(crate::error::ErrorKind::InvalidReference));
    }

    #[test]
    fn removed_entities_no_longer_resolve() {
        let mut m = Module::new();
        let a = m.add_func(unit(), Code::default());
        let b = m.add_func(unit(), Code {
            locals: vec![ValType::I64],
            body: Expr::new(vec![Instr::Simple(SimpleOp::Nop)]),
        });
        if let Target::Local(id) = a.0 {
            m.funcs.remove(id);
        }
        assert!(m.func_index(&a).is_err());
        assert_eq!(m.func_index(&b), Ok(0));

        // The body goes away with the function.
        let (_, left) = m.funcs.at(0).unwrap();
        assert_eq!(left.code.locals, vec![ValType::I64]);
        assert_eq!(m.exprs().count(), 1);
    }

    #[test]
    fn intern_reuses_equal_types() {
        let mut types = TypeSection::default();
        let a = types.intern(FuncType::new(&[ValType::I32], &[]));
        let b = types.intern(unit());
        let c = types.intern(FuncType::new(&[ValType::I32], &[]));
        assert_eq!((a, b, c), (0, 1, 0));
        assert_eq!(types.len(), 2);
    }

    #[test]
    fn precedence_orders_sections() {
        let keys: Vec<u32> = SectionId::ORDERED.iter().map(|id| id.precedence()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(SectionId::DataCount.precedence() < SectionId::Code.precedence());

        let before = Placement::Before(SectionId::Code).precedence();
        let after = Placement::After(SectionId::DataCount).precedence();
        assert!(after < before && before < SectionId::Code.precedence());
        assert!(Placement::Start.precedence() < SectionId::Type.precedence());
        assert!(Placement::End.precedence() > SectionId::Data.precedence());
    }

    #[test]
    fn link_resolves_debug_names_before_exports() {
        let mut m = Module::new();
        let imp = m.add_import("env", "log", ImportDesc::Func(unit()));
        let f = m.add_func(unit(), Code::default());
        let g = m.add_func(unit(), Code {
            locals: vec![],
            body: Expr::new(vec![Instr::call_named("helper"), Instr::call_named("log")]),
        });
        if let Target::Local(id) = f.0 {
            m.funcs.get_mut(id).unwrap().name = Some("helper".into());
        }
        m.exports.push(Export { name: "helper".into(), desc: ExportDesc::Func(g.clone()) });
        m.start = Some(FuncRef::named("log"));

        m.link().unwrap();
        let (_, linked) = m.funcs.at(1).unwrap();
        assert_eq!(linked.code.body.body, vec![Instr::Call(f), Instr::Call(FuncRef::import(imp))]);
        assert_eq!(m.start, Some(FuncRef::import(imp)));
    }

    #[test]
    fn link_fails_on_unknown_names() {
        let mut m = Module::new();
        m.add_func(unit(), Code { locals: vec![], body: Expr::new(vec![Instr::call_named("nope")]) });
        assert_eq!(m.link().map_err(|e| e.kind()), Err(crate::error::ErrorKind::InvalidReference));
    }

    #[test]
    fn single_memory_unless_enabled() {
        let mut m = Module::new();
        let limits = Limits { min: 1, max: None };
        m.add_import("env", "mem", ImportDesc::Mem(MemType { limits }));
        m.mems.append(Mem { type_: MemType { limits } });

        assert!(m.check_structure(&Features::default()).is_err());
        assert!(m.check_structure(&Features::default().with_multi_memory(true)).is_ok());
    }

    #[test]
    fn intern_types_collects_nested_types() {
        let mut m = Module::new();
        let sig = FuncType::new(&[ValType::I64], &[ValType::I64]);
        m.add_func(unit(), Code {
            locals: vec![],
            body: Expr::new(vec![Instr::block(sig.clone(), |_| vec![Instr::Simple(SimpleOp::Nop)])]),
        });
        m.intern_types();
        assert_eq!(m.types.index_of(&unit()), Some(0));
        assert_eq!(m.types.index_of(&sig), Some(1));
    }
}
