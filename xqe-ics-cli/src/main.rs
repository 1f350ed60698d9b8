mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "xqe-ics")]
#[command(about = "喜鹊儿课程表导出工具")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 启用详细日志
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 登录教务系统获取课程表并生成ICS文件
    Generate {
        /// 学号
        #[arg(short, long)]
        username: String,

        #[command(flatten)]
        password: PasswordArgs,

        /// 教务系统地址
        #[arg(long)]
        base_url: Option<String>,

        /// 节次时间表
        #[arg(short, long, default_value = "timetable.json")]
        timetable: String,

        /// 提醒时间（分钟），-1 关闭，0 为上课时提醒
        #[arg(short, long, default_value_t = 30, allow_negative_numbers = true)]
        reminder: i64,

        /// 输出文件路径
        #[arg(short, long)]
        output: Option<String>,
    },

    /// 解析保存下来的课表页面，输出课程JSON
    Parse {
        /// 课表页面HTML文件
        html: String,

        /// 输出文件路径，默认打印到标准输出
        #[arg(short, long)]
        output: Option<String>,
    },

    /// 由课程JSON生成ICS文件
    Render {
        /// `parse` 输出的课程JSON文件
        courses: String,

        /// 节次时间表
        #[arg(short, long, default_value = "timetable.json")]
        timetable: String,

        /// 提醒时间（分钟），-1 关闭，0 为上课时提醒
        #[arg(short, long, default_value_t = 30, allow_negative_numbers = true)]
        reminder: i64,

        /// 输出文件路径
        #[arg(short, long, default_value = "courses.ics")]
        output: String,
    },

    /// 显示节次时间表
    Periods {
        /// 节次时间表
        #[arg(short, long, default_value = "timetable.json")]
        timetable: String,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PasswordArgs {
    /// 明文密码，本地计算MD5后使用
    #[arg(short = 'P', long)]
    password: Option<String>,

    /// 密码的MD5值（32位十六进制）
    #[arg(long)]
    password_md5: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志级别
    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("xqe_ics_cli={log_level},xqe_ics_core={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Generate {
            username,
            password,
            base_url,
            timetable,
            reminder,
            output,
        } => {
            let password_md5 = match (password.password, password.password_md5) {
                (_, Some(md5)) => md5,
                (Some(plain), None) => commands::password_digest(&plain),
                (None, None) => anyhow::bail!("需要提供 --password 或 --password-md5"),
            };
            commands::generate_command(commands::GenerateParams {
                username,
                password_md5,
                base_url,
                timetable,
                reminder,
                output,
            })
            .await
        }

        Commands::Parse { html, output } => commands::parse_command(&html, output.as_deref()),

        Commands::Render {
            courses,
            timetable,
            reminder,
            output,
        } => commands::render_command(&courses, &timetable, reminder, &output),

        Commands::Periods { timetable } => commands::periods_command(&timetable),
    }
}
