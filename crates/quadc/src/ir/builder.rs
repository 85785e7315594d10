//! IR builder: module accumulation and the insertion cursor

use super::inst::{Block, ExternDecl, Function, Global, Inst, Module, Reg, StringData, Ty};

/// Handle of a block in the function currently being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef(usize);

/// Builds an [`Module`] one function at a time.
///
/// Blocks appear in the emitted text in creation order; the entry
/// block of every function is named `entry`. Temporaries restart at
/// `%t0` per function.
pub struct IrBuilder {
    module: Module,
    cur_func: Option<usize>,
    cursor: Option<usize>,
    temps: u32,
    strings: u32,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self {
            module: Module::new(),
            cur_func: None,
            cursor: None,
            temps: 0,
            strings: 0,
        }
    }

    pub fn declare_extern(&mut self, name: &str, ret: Ty, params: Vec<Ty>, varargs: bool) {
        self.module.externals.push(ExternDecl {
            name: name.to_string(),
            ret,
            params,
            varargs,
        });
    }

    pub fn declare_global(&mut self, name: &str, ty: Ty) {
        self.module.globals.push(Global {
            name: name.to_string(),
            ty,
        });
    }

    /// Open a new function with an `entry` block and move the
    /// insertion cursor there.
    pub fn begin_function(&mut self, name: String, ret: Ty, params: Vec<(String, Ty)>) -> BlockRef {
        self.module.functions.push(Function {
            name,
            ret,
            params,
            blocks: vec![Block::new("entry")],
        });
        self.cur_func = Some(self.module.functions.len() - 1);
        self.cursor = Some(0);
        self.temps = 0;
        BlockRef(0)
    }

    /// Create a block in the current function without moving the
    /// cursor.
    pub fn add_block(&mut self, name: impl Into<String>) -> BlockRef {
        let func = &mut self.module.functions[self.cur_func.expect("a function is open")];
        func.blocks.push(Block::new(name));
        BlockRef(func.blocks.len() - 1)
    }

    pub fn block_label(&self, block: BlockRef) -> String {
        let func = &self.module.functions[self.cur_func.expect("a function is open")];
        func.blocks[block.0].name.clone()
    }

    /// Move the insertion cursor.
    pub fn set_insert_point(&mut self, block: BlockRef) {
        self.cursor = Some(block.0);
    }

    pub fn new_temp(&mut self) -> Reg {
        let reg = Reg(format!("t{}", self.temps));
        self.temps += 1;
        reg
    }

    /// Append an instruction at the cursor.
    pub fn emit(&mut self, inst: Inst) {
        if let (Some(func), Some(block)) = (self.cur_func, self.cursor) {
            self.module.functions[func].blocks[block].insts.push(inst);
        }
    }

    /// Intern an addressable string constant, returning its label.
    pub fn global_string(&mut self, text: &str) -> String {
        let label = format!(".str.{}", self.strings);
        self.strings += 1;
        self.module.strings.push(StringData {
            label: label.clone(),
            text: text.to_string(),
        });
        label
    }

    pub fn finish(&mut self) -> Module {
        self.cur_func = None;
        self.cursor = None;
        std::mem::take(&mut self.module)
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Value;

    #[test]
    fn test_blocks_appear_in_creation_order() {
        let mut builder = IrBuilder::new();
        let entry = builder.begin_function("f".into(), Ty::I32, vec![]);
        let l2 = builder.add_block("L2");
        let l1 = builder.add_block("L1");
        assert_eq!(builder.block_label(entry), "entry");
        assert_eq!(builder.block_label(l2), "L2");
        assert_eq!(builder.block_label(l1), "L1");

        let module = builder.finish();
        let names: Vec<_> = module.functions[0]
            .blocks
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(names, vec!["entry", "L2", "L1"]);
    }

    #[test]
    fn test_cursor_targets_selected_block() {
        let mut builder = IrBuilder::new();
        builder.begin_function("f".into(), Ty::I32, vec![]);
        let l1 = builder.add_block("L1");
        builder.set_insert_point(l1);
        builder.emit(Inst::Ret {
            ty: Ty::I32,
            val: Some(Value::Int(0)),
        });

        let module = builder.finish();
        assert!(module.functions[0].blocks[0].insts.is_empty());
        assert_eq!(module.functions[0].blocks[1].insts.len(), 1);
    }

    #[test]
    fn test_temps_restart_per_function() {
        let mut builder = IrBuilder::new();
        builder.begin_function("f".into(), Ty::I32, vec![]);
        assert_eq!(builder.new_temp(), Reg("t0".into()));
        assert_eq!(builder.new_temp(), Reg("t1".into()));
        builder.begin_function("g".into(), Ty::I32, vec![]);
        assert_eq!(builder.new_temp(), Reg("t0".into()));
    }

    #[test]
    fn test_string_labels_are_sequential() {
        let mut builder = IrBuilder::new();
        assert_eq!(builder.global_string("a"), ".str.0");
        assert_eq!(builder.global_string("b"), ".str.1");
    }
}
