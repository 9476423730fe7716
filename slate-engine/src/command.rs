use std::collections::HashMap;

use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub store: &'a mut DocumentStore,
}

/// 本地用户输入的命令总线，按名称分发。
pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        for command in BUILTIN_COMMANDS {
            bus.register(*command);
        }
        bus.register(GoToPageCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

/// 无参数命令：名称加一个作用于 store 的函数。
#[derive(Clone, Copy)]
struct SimpleCommand {
    name: &'static str,
    run: fn(&mut DocumentStore) -> CommandResponse,
}

impl CommandHandler for SimpleCommand {
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        (self.run)(context.store)
    }
}

const BUILTIN_COMMANDS: &[SimpleCommand] = &[
    SimpleCommand {
        name: "undo",
        run: |store| {
            if store.undo() {
                CommandResponse::ok("已撤销")
            } else {
                CommandResponse::err("没有可撤销的操作")
            }
        },
    },
    SimpleCommand {
        name: "redo",
        run: |store| {
            if store.redo() {
                CommandResponse::ok("已重做")
            } else {
                CommandResponse::err("没有可重做的操作")
            }
        },
    },
    SimpleCommand {
        name: "next_page",
        run: |store| {
            store.next_page();
            CommandResponse::ok(format!("当前页: {}", store.viewer().current_page))
        },
    },
    SimpleCommand {
        name: "previous_page",
        run: |store| {
            store.previous_page();
            CommandResponse::ok(format!("当前页: {}", store.viewer().current_page))
        },
    },
    SimpleCommand {
        name: "zoom_in",
        run: |store| {
            store.zoom_in();
            CommandResponse::ok(format!("缩放: {:.2}", store.viewer().zoom))
        },
    },
    SimpleCommand {
        name: "zoom_out",
        run: |store| {
            store.zoom_out();
            CommandResponse::ok(format!("缩放: {:.2}", store.viewer().zoom))
        },
    },
    SimpleCommand {
        name: "rotate_clockwise",
        run: |store| {
            store.rotate_clockwise();
            CommandResponse::ok(format!("旋转: {}°", store.viewer().rotation.degrees()))
        },
    },
    SimpleCommand {
        name: "rotate_counterclockwise",
        run: |store| {
            store.rotate_counterclockwise();
            CommandResponse::ok(format!("旋转: {}°", store.viewer().rotation.degrees()))
        },
    },
    SimpleCommand {
        name: "delete_selection",
        run: |store| match store.selection().cloned() {
            Some(id) => {
                store.remove_annotation(&id);
                CommandResponse::ok(format!("已删除批注 {id}"))
            }
            None => CommandResponse::err("当前没有选中的批注"),
        },
    },
    SimpleCommand {
        name: "clear_selection",
        run: |store| {
            store.clear_selection();
            CommandResponse::ok("选中已清空")
        },
    },
    SimpleCommand {
        name: "toggle_sidebar",
        run: |store| {
            store.toggle_sidebar();
            let state = if store.viewer().sidebar_visible {
                "显示"
            } else {
                "隐藏"
            };
            CommandResponse::ok(format!("侧边栏已{state}"))
        },
    },
];

struct GoToPageCommand;

impl CommandHandler for GoToPageCommand {
    fn name(&self) -> &'static str {
        "go_to_page"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(page) = request
            .args
            .first()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
        else {
            return CommandResponse::err("go_to_page 需要一个页码参数");
        };
        context.store.set_page(page);
        CommandResponse::ok(format!("当前页: {}", context.store.viewer().current_page))
    }
}
