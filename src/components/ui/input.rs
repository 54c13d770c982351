use leptos::html;
use leptos::prelude::*;
use tw_merge::tw_merge;
use wasm_bindgen::JsCast;

#[component]
pub fn Input(
    #[prop(into, optional)] class: String,

    #[prop(into, default = "text")] r#type: &'static str,
    #[prop(into, optional)] placeholder: String,
    #[prop(into, optional)] id: String,
    #[prop(optional)] disabled: bool,

    // Two-way binding.
    //
    // NOTE: manual wiring instead of `bind:value=...`; the binding macros
    // have shifted across Leptos versions and this form builds everywhere.
    #[prop(into)] bind_value: RwSignal<String>,

    #[prop(optional)] node_ref: NodeRef<html::Input>,
) -> impl IntoView {
    let merged_class = tw_merge!(
        "flex h-9 w-full min-w-0 rounded-md border border-input bg-transparent px-3 py-1 \
         text-sm placeholder:text-muted-foreground outline-none transition-colors \
         focus-visible:border-ring focus-visible:ring-2 focus-visible:ring-ring/50 \
         disabled:pointer-events-none disabled:opacity-50",
        class
    );

    let on_input = move |ev: web_sys::Event| {
        if let Some(target) = ev.target() {
            if let Some(input) = target.dyn_ref::<web_sys::HtmlInputElement>() {
                bind_value.set(input.value());
            }
        }
    };

    view! {
        <input
            type=r#type
            class=merged_class
            placeholder=placeholder
            id=id
            disabled=disabled
            prop:value=move || bind_value.get()
            on:input=on_input
            node_ref=node_ref
        />
    }
    .into_any()
}
