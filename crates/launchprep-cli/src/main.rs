use launchprep_lib::cli::{
    EmbeddedPayloads, ResolvedCommand, parse_args, resolve_command, run_delete, run_download,
    run_install, run_resolve, run_status, run_swap,
};
use launchprep_lib::error::LaunchPrepError;
use launchprep_lib::extractor::LIBRARY_FILE_NAME;
use launchprep_lib::preparation::{PATCH_TOOL_NAME, PRELOADER_LIBRARY_NAME, PreparationPayloads};
use launchprep_lib::provision::NativeToolRecord;

static EXTRACTION_LIBRARY: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/launcher_core.dll"));
static VCRUNTIME: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/vcruntime140.dll"));
static VCRUNTIME_1: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/vcruntime140_1.dll"));
static MSVCP: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/msvcp140.dll"));
static PRELOADER: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/PreLoader.dll"));
static PATCH_TOOL: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/PeEditor.exe"));

fn embedded_payloads() -> EmbeddedPayloads {
    EmbeddedPayloads {
        extraction_library: NativeToolRecord::library(LIBRARY_FILE_NAME, EXTRACTION_LIBRARY),
        preparation: PreparationPayloads {
            runtime_libraries: vec![
                NativeToolRecord::library("vcruntime140.dll", VCRUNTIME),
                NativeToolRecord::library("vcruntime140_1.dll", VCRUNTIME_1),
                NativeToolRecord::library("msvcp140.dll", MSVCP),
            ],
            preloader: NativeToolRecord::library(PRELOADER_LIBRARY_NAME, PRELOADER),
            patch_tool: NativeToolRecord::executable(PATCH_TOOL_NAME, PATCH_TOOL),
        },
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), LaunchPrepError> {
    color_eyre::install()?;

    let args = parse_args();
    let command = resolve_command(args.command, args.config_path.as_deref())?;
    let payloads = embedded_payloads();

    match command {
        ResolvedCommand::Download(params) => run_download(params).await?,
        ResolvedCommand::Install(params) => run_install(params, &payloads).await?,
        ResolvedCommand::Swap(params) => run_swap(params, &payloads).await?,
        ResolvedCommand::Resolve(params) => run_resolve(params, &payloads)?,
        ResolvedCommand::Delete(params) => run_delete(params, &payloads)?,
        ResolvedCommand::Status(params) => run_status(params, &payloads)?,
    }

    Ok(())
}
