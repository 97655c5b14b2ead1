/*!
Writing a parsed module back out as WGSL and parsing the result must give
the same module again.
*/

use std::fmt::Write as _;

use strata::{ast, back, front::wgsl, Handle};

const SOURCES: &[(&str, &str)] = &[
    (
        "directives",
        "enable f16;
enable f16, f16;
requires readonly_and_readwrite_storage_textures;
diagnostic(off, derivative_uniformity);
const h = 1.5h;",
    ),
    (
        "types",
        "struct Light {
    @align(16) position: vec3<f32>,
    color: vec3f,
    @size(16) intensity: f32,
}
alias Lights = array<Light, 4>;
@group(0) @binding(0) var<uniform> lights: Lights;
@group(0) @binding(1) var<storage, read_write> counts: array<atomic<u32>>;
@group(1) @binding(0) var t: texture_2d<f32>;
@group(1) @binding(1) var s: sampler;
var<private> m: mat3x3<f32>;
var<workgroup> shared_data: array<vec4<i32>, 64>;",
    ),
    (
        "constants",
        "const a = 1 + 2 * 3;
const b = (1 + 2) * 3;
const c = -a;
const d: u32 = 0xffu;
const e = 1e-3f;
const f = vec3(1.0, 2.0, 3.0).xy;
override scale: f32 = 2.0;
@id(7) override bias = 0.5;
const_assert b > a;",
    ),
    (
        "control flow",
        "fn f(x: i32) -> i32 {
    var sum = 0;
    for (var i = 0; i < x; i++) {
        if i == 2 {
            continue;
        } else if i > 8 {
            break;
        } else {
            sum += i;
        }
    }
    while sum > 100 {
        sum /= 2;
    }
    loop {
        sum--;
        continuing {
            break if sum < 10;
        }
    }
    switch sum {
        case 1, 2: {
            sum = sum << 1u;
        }
        case default {
        }
    }
    {
        let inner = sum & 3;
        _ = inner;
    }
    return sum;
}",
    ),
    (
        "entry points",
        "struct VertexOut {
    @builtin(position) @invariant position: vec4<f32>,
    @location(0) @interpolate(flat) id: u32,
    @location(1) @interpolate(linear, centroid) uv: vec2<f32>,
}
@vertex
fn vs(@builtin(vertex_index) index: u32) -> VertexOut {
    var out: VertexOut;
    out.position = vec4<f32>(f32(index), 0.0, 0.0, 1.0);
    out.id = index;
    out.uv = vec2(0.5);
    return out;
}
@group(0) @binding(0) var tex: texture_2d<f32>;
@group(0) @binding(1) var samp: sampler;
@fragment
fn fs(in: VertexOut) -> @location(0) vec4<f32> {
    if in.uv.x < 0.0 {
        discard;
    }
    return textureSample(tex, samp, in.uv);
}
@compute @workgroup_size(8, 8, 1)
fn cs(@builtin(global_invocation_id) id: vec3<u32>) {
    workgroupBarrier();
}",
    ),
    (
        "pointers and bitcasts",
        "fn g(p: ptr<function, i32>) {
    *p = bitcast<i32>(1u);
    let q = &(*p);
    let r = ~(*q);
    let s = !(r == 0);
    _ = s;
}
@diagnostic(warning, derivative_uniformity)
fn h(v: vec4<f32>) -> f32 {
    return dot(v, v) * -(1.0);
}",
    ),
];

fn parse(name: &str, source: &str) -> ast::Module {
    match wgsl::parse_str(source) {
        Ok(module) => module,
        Err(error) => panic!("{name}: {}", error.emit_to_string()),
    }
}

/// Writes out the structure of a module, one line per declaration, leaving
/// out spans and node ids.
struct Shape<'a> {
    module: &'a ast::Module,
    out: String,
}

impl<'a> Shape<'a> {
    fn of(module: &'a ast::Module) -> Vec<String> {
        module
            .declarations()
            .iter()
            .map(|(_, decl)| {
                let mut shape = Shape {
                    module,
                    out: String::new(),
                };
                shape.declaration(&decl.kind);
                shape.out
            })
            .collect()
    }

    fn declaration(&mut self, kind: &ast::GlobalDeclKind) {
        use ast::GlobalDeclKind as Gdk;
        match *kind {
            Gdk::DiagnosticDirective(ref control) => self.control(control),
            Gdk::Enable { ref extensions } => {
                for extension in extensions {
                    let _ = write!(self.out, "enable {:?};", extension.kind);
                }
            }
            Gdk::Requires { ref features } => {
                for &(feature, _) in features {
                    let _ = write!(self.out, "requires {feature:?};");
                }
            }
            Gdk::Function(ref function) => {
                self.attributes(&function.attributes);
                let _ = write!(self.out, "fn {}(", function.name.name);
                for param in function.params.iter() {
                    self.attributes(&param.attributes);
                    let _ = write!(self.out, "{}: ", param.name.name);
                    self.expr(param.ty);
                    self.out.push(',');
                }
                self.out.push_str(") -> ");
                self.attributes(&function.return_attributes);
                self.optional(function.return_type);
                self.block(&function.body);
            }
            Gdk::Variable(ref var) => self.variable(var),
            Gdk::TypeDecl(ast::TypeDecl::Struct(ref s)) => {
                let _ = write!(self.out, "struct {} {{", s.name.name);
                for member in s.members.iter() {
                    self.attributes(&member.attributes);
                    let _ = write!(self.out, "{}: ", member.name.name);
                    self.expr(member.ty);
                    self.out.push(',');
                }
                self.out.push('}');
            }
            Gdk::TypeDecl(ast::TypeDecl::Alias(ref alias)) => {
                let _ = write!(self.out, "alias {} = ", alias.name.name);
                self.expr(alias.ty);
            }
            Gdk::ConstAssert(condition) => {
                self.out.push_str("const_assert ");
                self.expr(condition);
            }
        }
    }

    fn control(&mut self, control: &ast::DiagnosticControl) {
        let _ = write!(self.out, "diagnostic({:?}, {:?})", control.severity, control.rule.key());
    }

    fn attributes(&mut self, attributes: &[ast::Attribute]) {
        use ast::AttributeKind as Ak;
        for attribute in attributes {
            let _ = write!(self.out, "@{}(", attribute.kind.name());
            match attribute.kind {
                Ak::Align(e) | Ak::Binding(e) | Ak::Builtin(e) | Ak::Group(e) | Ak::Id(e) => {
                    self.expr(e)
                }
                Ak::Location(e) | Ak::Size(e) => self.expr(e),
                Ak::Interpolate { ty, sampling } => {
                    self.expr(ty);
                    self.optional(sampling);
                }
                Ak::WorkgroupSize { x, y, z } => {
                    self.expr(x);
                    self.optional(y);
                    self.optional(z);
                }
                Ak::Diagnostic(ref control) => self.control(control),
                Ak::Compute | Ak::Fragment | Ak::Invariant | Ak::MustUse | Ak::Vertex => {}
            }
            self.out.push_str(") ");
        }
    }

    fn variable(&mut self, var: &ast::Variable) {
        self.attributes(&var.attributes);
        let _ = write!(self.out, "{} ", var.kind.keyword());
        if let ast::VariableKind::Var {
            address_space,
            access,
        } = var.kind
        {
            self.optional(address_space);
            self.optional(access);
        }
        let _ = write!(self.out, " {}: ", var.name.name);
        self.optional(var.ty);
        self.out.push_str(" = ");
        self.optional(var.initializer);
        self.out.push(';');
    }

    fn block(&mut self, block: &ast::Block) {
        self.attributes(&block.attributes);
        self.out.push('{');
        for stmt in block.statements.iter() {
            self.statement(stmt);
        }
        self.out.push('}');
    }

    fn statement(&mut self, stmt: &ast::Statement) {
        use ast::StatementKind as Sk;
        match stmt.kind {
            Sk::Block(ref block) => self.block(block),
            Sk::If(ref if_) => {
                self.out.push_str("if ");
                self.expr(if_.condition);
                self.block(&if_.accept);
                if let Some(ref reject) = if_.reject {
                    self.out.push_str("else ");
                    self.statement(reject);
                }
            }
            Sk::Switch(ref switch) => {
                self.out.push_str("switch ");
                self.expr(switch.selector);
                for case in switch.cases.iter() {
                    self.out.push_str("case ");
                    for selector in case.selectors.iter() {
                        match *selector {
                            ast::CaseSelector::Default => self.out.push_str("default"),
                            ast::CaseSelector::Expr(e) => self.expr(e),
                        }
                        self.out.push(',');
                    }
                    self.block(&case.body);
                }
            }
            Sk::Loop(ref loop_) => {
                self.out.push_str("loop ");
                self.block(&loop_.body);
                if let Some(ref continuing) = loop_.continuing {
                    self.out.push_str("continuing ");
                    self.block(continuing);
                }
            }
            Sk::For(ref for_) => {
                self.out.push_str("for (");
                if let Some(ref init) = for_.init {
                    self.statement(init);
                }
                self.optional(for_.condition);
                if let Some(ref update) = for_.update {
                    self.statement(update);
                }
                self.out.push(')');
                self.block(&for_.body);
            }
            Sk::While(ref while_) => {
                self.out.push_str("while ");
                self.expr(while_.condition);
                self.block(&while_.body);
            }
            Sk::Break => self.out.push_str("break;"),
            Sk::BreakIf(condition) => {
                self.out.push_str("break if ");
                self.expr(condition);
            }
            Sk::Continue => self.out.push_str("continue;"),
            Sk::Return(value) => {
                self.out.push_str("return ");
                self.optional(value);
            }
            Sk::Discard => self.out.push_str("discard;"),
            Sk::Declaration(ref var) => self.variable(var),
            Sk::Assignment { lhs, op, rhs } => {
                self.expr(lhs);
                let _ = write!(self.out, " {op:?}= ");
                self.expr(rhs);
            }
            Sk::Increment(e) => {
                self.expr(e);
                self.out.push_str("++");
            }
            Sk::Decrement(e) => {
                self.expr(e);
                self.out.push_str("--");
            }
            Sk::Call(e) => self.expr(e),
            Sk::ConstAssert(e) => {
                self.out.push_str("const_assert ");
                self.expr(e);
            }
        }
        self.out.push(';');
    }

    fn optional(&mut self, expr: Option<Handle<ast::Expression>>) {
        match expr {
            Some(expr) => self.expr(expr),
            None => self.out.push('-'),
        }
    }

    fn list(&mut self, exprs: &[Handle<ast::Expression>]) {
        for &expr in exprs {
            self.expr(expr);
            self.out.push(',');
        }
    }

    fn expr(&mut self, handle: Handle<ast::Expression>) {
        use ast::ExpressionKind as Ek;
        match *self.module.expression(handle) {
            Ek::Literal(literal) => {
                let _ = write!(self.out, "{literal:?}");
            }
            Ek::Ident {
                ref ident,
                ref template_args,
            } => {
                self.out.push_str(&ident.name);
                if !template_args.is_empty() {
                    self.out.push('<');
                    self.list(template_args);
                    self.out.push('>');
                }
            }
            Ek::Call {
                callee,
                ref arguments,
            } => {
                self.expr(callee);
                self.out.push('(');
                self.list(arguments);
                self.out.push(')');
            }
            Ek::Bitcast { ty, expr } => {
                self.out.push_str("bitcast<");
                self.expr(ty);
                self.out.push_str(">(");
                self.expr(expr);
                self.out.push(')');
            }
            Ek::Unary { op, expr } => {
                let _ = write!(self.out, "({op:?} ");
                self.expr(expr);
                self.out.push(')');
            }
            Ek::Binary { op, left, right } => {
                self.out.push('(');
                self.expr(left);
                let _ = write!(self.out, " {op:?} ");
                self.expr(right);
                self.out.push(')');
            }
            Ek::Index { base, index } => {
                self.expr(base);
                self.out.push('[');
                self.expr(index);
                self.out.push(']');
            }
            Ek::Member { base, ref member } => {
                self.expr(base);
                let _ = write!(self.out, ".{}", member.name);
            }
            Ek::Phony => self.out.push('_'),
        }
    }
}

#[test]
fn written_modules_parse_again() {
    let _ = env_logger::builder().is_test(true).try_init();
    for &(name, source) in SOURCES {
        let first = parse(name, source);
        let text = back::wgsl::write_string(&first).unwrap();
        let second = parse(name, &text);
        let (before, after) = (Shape::of(&first), Shape::of(&second));
        assert_eq!(before.len(), after.len(), "{name}:\n{text}");
        for (before, after) in before.iter().zip(after.iter()) {
            assert_eq!(before, after, "{name}:\n{text}");
        }
        let again = back::wgsl::write_string(&second).unwrap();
        assert_eq!(text, again, "{name}: output is not stable");
    }
}

#[test]
fn written_modules_resolve() {
    let resolvable = ["types", "control flow"];
    for &(name, source) in SOURCES.iter().filter(|&&(name, _)| resolvable.contains(&name)) {
        let module = parse(name, source);
        let text = back::wgsl::write_string(&module).unwrap();
        let module = parse(name, &text);
        let info = strata::resolve::resolve_with_diagnostics(&module, &Default::default());
        let errors = info
            .diagnostics
            .iter()
            .filter(|d| d.severity.is_error())
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>();
        assert!(errors.is_empty(), "{name}: {errors:?}\n{text}");
    }
}

#[test]
fn precedence_survives() {
    let module = parse("precedence", "const x = a + b * c;\nconst y = (a + b) * c;");
    let text = back::wgsl::write_string(&module).unwrap();
    assert!(text.contains("const x = a + (b * c);"), "{text}");
    assert!(text.contains("const y = (a + b) * c;"), "{text}");
}
