use serde::{Deserialize, Serialize};

/// A raw stack frame as recorded in the profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl StackFrame {
    pub fn new(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        StackFrame {
            function: function.into(),
            file: file.into(),
            line,
        }
    }
}

/// Native symbols of the interpreter's own evaluation machinery
const INTERNAL_FUNCTION_PREFIXES: &[&str] = &[
    "_PyEval_",
    "PyEval_",
    "_PyObject_",
    "PyObject_Call",
    "PyObject_Vectorcall",
    "_PyFunction_",
    "PyVectorcall_",
    "method_vectorcall",
    "cfunction_call",
    "cfunction_vectorcall",
    "slot_tp_",
    "_Py_",
];

/// Python-level entry points that only bootstrap the real program
const BOOTSTRAP_FUNCTIONS: &[&str] = &["_run_code", "_run_module_as_main", "_run_module_code"];

/// Native import helpers
const IMPORT_FUNCTIONS: &[&str] = &[
    "import_name",
    "import_from",
    "import_all_from",
    "PyImport_ImportModuleLevelObject",
    "_PyImport_LoadDynamicModuleWithSpec",
];

fn is_native_file(file: &str) -> bool {
    file.is_empty() || file.ends_with(".c") || file.ends_with(".h") || file.ends_with(".cpp")
}

/// Frames of the interpreter loop itself. These are dropped entirely when
/// building the tree.
pub fn is_interpreter_internal(frame: &StackFrame) -> bool {
    is_native_file(&frame.file)
        && INTERNAL_FUNCTION_PREFIXES
            .iter()
            .any(|p| frame.function.starts_with(p))
}

/// Frames belonging to the module import machinery
pub fn is_import_system(frame: &StackFrame) -> bool {
    frame.file.contains("<frozen importlib")
        || frame.file.contains("importlib/_bootstrap")
        || IMPORT_FUNCTIONS.contains(&frame.function.as_str())
}

/// Whether a frame is worth showing by default
pub fn is_interesting(frame: &StackFrame) -> bool {
    if is_interpreter_internal(frame) {
        return false;
    }
    if frame.file.ends_with("runpy.py") {
        return false;
    }
    if frame.file.contains("memray/commands/") || frame.file.ends_with("memray/__main__.py") {
        return false;
    }
    !BOOTSTRAP_FUNCTIONS.contains(&frame.function.as_str())
}
