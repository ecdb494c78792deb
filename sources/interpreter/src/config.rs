/// Knobs the embedder sets before the VM starts
#[derive(Debug, Clone)]
pub struct Config {
    /// Frames a single thread may hold before StackOverflowError is raised
    pub max_stack: usize,
    /// Host stack size for every VM thread
    pub thread_stack_size: usize,
    pub bootstrap_classes: Vec<String>,
    pub main_thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_stack: 512,
            thread_stack_size: 1024 * 1024 * 16,
            bootstrap_classes: vec![
                "java/lang/Object".to_string(),
                "java/lang/Class".to_string(),
                "java/lang/String".to_string(),
            ],
            main_thread_name: "main".to_string(),
        }
    }
}

impl Config {
    pub fn with_max_stack(mut self, max_stack: usize) -> Self {
        self.max_stack = max_stack;
        self
    }

    pub fn with_thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = size;
        self
    }

    pub fn with_bootstrap_classes(mut self, classes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.bootstrap_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_main_thread_name(mut self, name: impl Into<String>) -> Self {
        self.main_thread_name = name.into();
        self
    }
}
