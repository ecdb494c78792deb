use anyhow::{anyhow, Result};

use crate::{
    attributes::{CodeAttribute, ConstantValue, ExceptionEntry, LineNumberEntry},
    classfile::{ClassDescriptor, FieldInfo, MethodInfo},
    flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
    opcode,
    pool::{ConstantClass, ConstantEntry, ConstantMember, ConstantPool, ConstantString},
};

/// Assembles a `ClassDescriptor` in code.
///
/// ```ignore
/// let mut class = ClassBuilder::new("Counter");
/// class.field("n", "I", FieldAccessFlags::STATIC);
/// let n = class.field_ref("Counter", "n", "I");
///
/// let mut code = CodeBuilder::new();
/// code.op_u16(GETSTATIC, n).op(ICONST_1).op(IADD).op(IRETURN);
/// class.method("next", "()I", MethodAccessFlags::STATIC, code.build()?);
/// ```
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    descriptor: ClassDescriptor,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let super_class = if name == "java/lang/Object" {
            None
        } else {
            Some("java/lang/Object".to_string())
        };

        Self {
            descriptor: ClassDescriptor {
                name,
                super_class,
                interfaces: vec![],
                access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
                constant_pool: ConstantPool::new(),
                fields: vec![],
                methods: vec![],
                attributes: vec![],
                source_file: None,
            },
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        let mut builder = Self::new(name);
        builder.descriptor.access_flags =
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT;
        builder
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn extends(&mut self, super_class: impl Into<String>) -> &mut Self {
        self.descriptor.super_class = Some(super_class.into());
        self
    }

    pub fn implements(&mut self, interface: impl Into<String>) -> &mut Self {
        self.descriptor.interfaces.push(interface.into());
        self
    }

    pub fn flags(&mut self, flags: ClassAccessFlags) -> &mut Self {
        self.descriptor.access_flags = flags;
        self
    }

    pub fn source_file(&mut self, file: impl Into<String>) -> &mut Self {
        self.descriptor.source_file = Some(file.into());
        self
    }

    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut self.descriptor.constant_pool
    }

    pub fn class_ref(&mut self, name: &str) -> u16 {
        self.pool().intern(ConstantEntry::Class(ConstantClass {
            name: name.to_string(),
        }))
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.pool().intern(ConstantEntry::Field(member(class, name, descriptor)))
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.pool().intern(ConstantEntry::Method(member(class, name, descriptor)))
    }

    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.pool()
            .intern(ConstantEntry::InterfaceMethod(member(class, name, descriptor)))
    }

    pub fn string(&mut self, value: &str) -> u16 {
        self.pool().intern(ConstantEntry::String(ConstantString {
            string: value.to_string(),
        }))
    }

    pub fn int(&mut self, value: i32) -> u16 {
        self.pool().intern(ConstantEntry::Integer(value))
    }

    pub fn float(&mut self, value: f32) -> u16 {
        self.pool().intern(ConstantEntry::Float(value))
    }

    pub fn long(&mut self, value: i64) -> u16 {
        self.pool().intern(ConstantEntry::Long(value))
    }

    pub fn double(&mut self, value: f64) -> u16 {
        self.pool().intern(ConstantEntry::Double(value))
    }

    pub fn field(&mut self, name: &str, descriptor: &str, flags: FieldAccessFlags) -> &mut Self {
        self.descriptor.fields.push(FieldInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags,
            constant_value: None,
            attributes: vec![],
        });
        self
    }

    pub fn constant(&mut self, name: &str, descriptor: &str, value: ConstantValue) -> &mut Self {
        self.descriptor.fields.push(FieldInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags: FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            constant_value: Some(value),
            attributes: vec![],
        });
        self
    }

    pub fn method(
        &mut self,
        name: &str,
        descriptor: &str,
        flags: MethodAccessFlags,
        code: CodeAttribute,
    ) -> &mut Self {
        self.descriptor.methods.push(MethodInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags,
            code: Some(code),
            attributes: vec![],
        });
        self
    }

    pub fn native_method(
        &mut self,
        name: &str,
        descriptor: &str,
        flags: MethodAccessFlags,
    ) -> &mut Self {
        self.descriptor.methods.push(MethodInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags: flags | MethodAccessFlags::NATIVE,
            code: None,
            attributes: vec![],
        });
        self
    }

    pub fn abstract_method(&mut self, name: &str, descriptor: &str) -> &mut Self {
        self.descriptor.methods.push(MethodInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            code: None,
            attributes: vec![],
        });
        self
    }

    /// Adds `<init>()V` that chains to the super constructor
    pub fn default_constructor(&mut self) -> &mut Self {
        let mut code = CodeBuilder::new();
        if let Some(super_class) = self.descriptor.super_class.clone() {
            let init = self.method_ref(&super_class, "<init>", "()V");
            code.op(opcode::ALOAD_0).op_u16(opcode::INVOKESPECIAL, init);
        }
        code.op(opcode::RETURN).max_locals(1);

        let code = code.finish_unchecked();
        self.method("<init>", "()V", MethodAccessFlags::PUBLIC, code)
    }

    pub fn build(&self) -> ClassDescriptor {
        self.descriptor.clone()
    }
}

fn member(class: &str, name: &str, descriptor: &str) -> ConstantMember {
    ConstantMember {
        class: class.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    }
}

/// A position in the code that may be jumped to before it is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone)]
enum Fixup {
    Short {
        operand: usize,
        instruction: usize,
        label: Label,
    },
    Wide {
        operand: usize,
        instruction: usize,
        label: Label,
    },
}

#[derive(Debug, Clone)]
struct PendingHandler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: Option<String>,
}

/// Emits bytecode for a single method, resolving label offsets on `build`
#[derive(Debug, Clone)]
pub struct CodeBuilder {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    handlers: Vec<PendingHandler>,
    line_numbers: Vec<LineNumberEntry>,
    max_stack: u16,
    max_locals: u16,
}

impl Default for CodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self {
            code: vec![],
            labels: vec![],
            fixups: vec![],
            handlers: vec![],
            line_numbers: vec![],
            max_stack: 16,
            max_locals: 8,
        }
    }

    pub fn pc(&self) -> usize {
        self.code.len()
    }

    pub fn max_stack(&mut self, max_stack: u16) -> &mut Self {
        self.max_stack = max_stack;
        self
    }

    pub fn max_locals(&mut self, max_locals: u16) -> &mut Self {
        self.max_locals = max_locals;
        self
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.code.push(opcode);
        self
    }

    pub fn op_u8(&mut self, opcode: u8, operand: u8) -> &mut Self {
        self.code.push(opcode);
        self.code.push(operand);
        self
    }

    pub fn op_i8(&mut self, opcode: u8, operand: i8) -> &mut Self {
        self.op_u8(opcode, operand as u8)
    }

    pub fn op_u16(&mut self, opcode: u8, operand: u16) -> &mut Self {
        self.code.push(opcode);
        self.code.extend_from_slice(&operand.to_be_bytes());
        self
    }

    pub fn op_i16(&mut self, opcode: u8, operand: i16) -> &mut Self {
        self.op_u16(opcode, operand as u16)
    }

    pub fn nops(&mut self, count: usize) -> &mut Self {
        self.code.extend(std::iter::repeat(opcode::NOP).take(count));
        self
    }

    pub fn iinc(&mut self, index: u8, delta: i8) -> &mut Self {
        self.code.extend_from_slice(&[opcode::IINC, index, delta as u8]);
        self
    }

    pub fn invokeinterface(&mut self, index: u16, count: u8) -> &mut Self {
        self.op_u16(opcode::INVOKEINTERFACE, index);
        self.code.extend_from_slice(&[count, 0]);
        self
    }

    pub fn multianewarray(&mut self, index: u16, dimensions: u8) -> &mut Self {
        self.op_u16(opcode::MULTIANEWARRAY, index);
        self.code.push(dimensions);
        self
    }

    /// A 16-bit relative branch (`if*`, `goto`)
    pub fn branch(&mut self, opcode: u8, label: Label) -> &mut Self {
        let instruction = self.code.len();
        self.code.push(opcode);
        self.fixups.push(Fixup::Short {
            operand: self.code.len(),
            instruction,
            label,
        });
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    pub fn goto_w(&mut self, label: Label) -> &mut Self {
        let instruction = self.code.len();
        self.code.push(opcode::GOTO_W);
        self.fixups.push(Fixup::Wide {
            operand: self.code.len(),
            instruction,
            label,
        });
        self.code.extend_from_slice(&[0, 0, 0, 0]);
        self
    }

    fn switch_padding(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }

    fn wide_target(&mut self, instruction: usize, label: Label) {
        self.fixups.push(Fixup::Wide {
            operand: self.code.len(),
            instruction,
            label,
        });
        self.code.extend_from_slice(&[0, 0, 0, 0]);
    }

    pub fn tableswitch(&mut self, low: i32, default: Label, targets: &[Label]) -> &mut Self {
        let instruction = self.code.len();
        self.code.push(opcode::TABLESWITCH);
        self.switch_padding();

        self.wide_target(instruction, default);
        let high = low + targets.len() as i32 - 1;
        self.code.extend_from_slice(&low.to_be_bytes());
        self.code.extend_from_slice(&high.to_be_bytes());
        for target in targets {
            self.wide_target(instruction, *target);
        }
        self
    }

    /// A `tableswitch` with literal offsets, relative to the opcode
    pub fn raw_tableswitch(&mut self, low: i32, high: i32, default: i32, offsets: &[i32]) -> &mut Self {
        self.code.push(opcode::TABLESWITCH);
        self.switch_padding();

        for value in [default, low, high].into_iter().chain(offsets.iter().copied()) {
            self.code.extend_from_slice(&value.to_be_bytes());
        }
        self
    }

    pub fn lookupswitch(&mut self, default: Label, pairs: &[(i32, Label)]) -> &mut Self {
        let instruction = self.code.len();
        self.code.push(opcode::LOOKUPSWITCH);
        self.switch_padding();

        self.wide_target(instruction, default);
        self.code
            .extend_from_slice(&(pairs.len() as i32).to_be_bytes());
        for (key, target) in pairs {
            self.code.extend_from_slice(&key.to_be_bytes());
            self.wide_target(instruction, *target);
        }
        self
    }

    pub fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.handlers.push(PendingHandler {
            start,
            end,
            handler,
            catch_type: catch_type.map(|c| c.to_string()),
        });
        self
    }

    /// Mark the next instruction as starting source line `line`
    pub fn line(&mut self, line: u16) -> &mut Self {
        self.line_numbers.push(LineNumberEntry {
            start_pc: self.code.len() as u16,
            line,
        });
        self
    }

    fn resolve(&self, label: Label) -> Result<usize> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or_else(|| anyhow!("label {} was never bound", label.0))
    }

    pub fn build(&self) -> Result<CodeAttribute> {
        let mut code = self.code.clone();

        for fixup in &self.fixups {
            match fixup {
                Fixup::Short {
                    operand,
                    instruction,
                    label,
                } => {
                    let offset = self.resolve(*label)? as i64 - *instruction as i64;
                    let offset = i16::try_from(offset)
                        .map_err(|_| anyhow!("branch offset {offset} does not fit in 16 bits"))?;
                    code[*operand..*operand + 2].copy_from_slice(&offset.to_be_bytes());
                }
                Fixup::Wide {
                    operand,
                    instruction,
                    label,
                } => {
                    let offset = (self.resolve(*label)? as i64 - *instruction as i64) as i32;
                    code[*operand..*operand + 4].copy_from_slice(&offset.to_be_bytes());
                }
            }
        }

        let exception_table = self
            .handlers
            .iter()
            .map(|h| {
                Ok(ExceptionEntry {
                    start_pc: self.resolve(h.start)? as u16,
                    end_pc: self.resolve(h.end)? as u16,
                    handler_pc: self.resolve(h.handler)? as u16,
                    catch_type: h.catch_type.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code,
            exception_table,
            line_numbers: self.line_numbers.clone(),
        })
    }

    /// Only for code without labels, where `build` cannot fail
    fn finish_unchecked(&self) -> CodeAttribute {
        CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code: self.code.clone(),
            exception_table: vec![],
            line_numbers: self.line_numbers.clone(),
        }
    }

    /// Add a raw exception table entry by pc, for tests that need exact ranges
    pub fn handler_at(
        &mut self,
        start_pc: u16,
        end_pc: u16,
        handler_pc: u16,
        catch_type: Option<&str>,
    ) -> &mut Self {
        let start = self.label();
        let end = self.label();
        let handler = self.label();
        self.labels[start.0] = Some(start_pc as usize);
        self.labels[end.0] = Some(end_pc as usize);
        self.labels[handler.0] = Some(handler_pc as usize);
        self.try_catch(start, end, handler, catch_type)
    }
}
