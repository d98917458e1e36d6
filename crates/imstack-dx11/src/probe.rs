use windows::core::HSTRING;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;

use imstack_core::ModuleProbe;

/// Asks the loader which graphics runtimes the current process has mapped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessModules;

impl ModuleProbe for ProcessModules {
    fn is_loaded(&self, module_name: &str) -> bool {
        unsafe { GetModuleHandleW(&HSTRING::from(module_name)).is_ok() }
    }
}
