//! Procedural macros for tanuki-gate
//!
//! This crate provides the `#[gitlab_tool]` attribute macro for defining GitLab MCP tools
//! with minimal boilerplate.

use darling::{FromMeta, ast::NestedMeta};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, Ident, parse_macro_input};

/// Arguments for the `#[gitlab_tool]` attribute
#[derive(Debug, FromMeta)]
struct GitLabToolArgs {
    /// Tool name (e.g., "get_merge_request")
    name: String,
    /// Tool description for MCP
    description: String,
    /// Tool category: "projects", "repository" or "merge_requests"
    category: String,
    /// Operation type: "read" or "write"
    operation: String,
    /// Optional: field naming the project the call targets
    #[darling(default)]
    project_field: Option<String>,
}

/// Attribute macro for GitLab MCP tools.
///
/// This macro generates:
/// - `ToolInfo` implementation (name, description, category, operation_type)
/// - `ProjectScoped` implementation; with `project_field` the registry
///   authorizes that project before the tool runs
/// - Automatically adds `#[derive(Debug, Clone, serde::Deserialize, schemars::JsonSchema)]`
///
/// # Example
///
/// ```ignore
/// #[gitlab_tool(
///     name = "get_merge_request",
///     description = "Get a single merge request",
///     category = "merge_requests",
///     operation = "read",
///     project_field = "project_id"
/// )]
/// pub struct GetMergeRequest {
///     /// Project ID or path
///     pub project_id: String,
///     /// Merge request IID
///     pub mr_iid: u64,
/// }
///
/// #[async_trait]
/// impl ToolExecutor for GetMergeRequest {
///     async fn execute(&self, ctx: &ToolContext) -> ToolResult<ToolOutput> {
///         // Your implementation here
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn gitlab_tool(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attr_args = match NestedMeta::parse_meta_list(attr.into()) {
        Ok(v) => v,
        Err(e) => return TokenStream::from(e.to_compile_error()),
    };

    let args = match GitLabToolArgs::from_list(&attr_args) {
        Ok(v) => v,
        Err(e) => return TokenStream::from(e.write_errors()),
    };

    let input = parse_macro_input!(item as DeriveInput);
    let expanded = impl_gitlab_tool(&args, &input);

    TokenStream::from(expanded)
}

fn impl_gitlab_tool(args: &GitLabToolArgs, input: &DeriveInput) -> TokenStream2 {
    let struct_name = &input.ident;
    let tool_name = &args.name;
    let description = &args.description;
    let category = &args.category;
    let operation = &args.operation;

    let category_variant = match category.as_str() {
        "projects" => quote! { crate::tools::ToolCategory::Projects },
        "repository" => quote! { crate::tools::ToolCategory::Repository },
        "merge_requests" => quote! { crate::tools::ToolCategory::MergeRequests },
        _ => {
            return syn::Error::new_spanned(input, format!("Unknown category: {}", category))
                .to_compile_error();
        }
    };

    let operation_variant = match operation.as_str() {
        "read" => quote! { crate::tools::OperationType::Read },
        "write" => quote! { crate::tools::OperationType::Write },
        _ => {
            return syn::Error::new_spanned(
                input,
                format!("Unknown operation: {}. Use: read or write", operation),
            )
            .to_compile_error();
        }
    };

    // Extract fields from the struct
    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(fields) => &fields.named,
            _ => {
                return syn::Error::new_spanned(
                    input,
                    "gitlab_tool only supports structs with named fields",
                )
                .to_compile_error();
            }
        },
        _ => {
            return syn::Error::new_spanned(input, "gitlab_tool only supports structs")
                .to_compile_error();
        }
    };

    let project_extraction = match &args.project_field {
        Some(field_name) => {
            let known = fields
                .iter()
                .any(|f| f.ident.as_ref().is_some_and(|i| i == field_name));
            if !known {
                return syn::Error::new_spanned(
                    input,
                    format!("project_field '{}' is not a field of this struct", field_name),
                )
                .to_compile_error();
            }
            let field_ident = Ident::new(field_name, proc_macro2::Span::call_site());
            quote! { Some(self.#field_ident.to_string()) }
        }
        None => quote! { None },
    };

    // Get the visibility, attributes (except our own), and struct body
    let vis = &input.vis;
    let attrs: Vec<_> = input.attrs.iter().collect();
    let generics = &input.generics;

    quote! {
        #(#attrs)*
        #[derive(Debug, Clone, serde::Deserialize, schemars::JsonSchema)]
        #vis struct #struct_name #generics {
            #fields
        }

        impl crate::tools::ToolInfo for #struct_name {
            fn name() -> &'static str {
                #tool_name
            }

            fn description() -> &'static str {
                #description
            }

            fn category() -> crate::tools::ToolCategory {
                #category_variant
            }

            fn operation_type() -> crate::tools::OperationType {
                #operation_variant
            }
        }

        impl crate::tools::ProjectScoped for #struct_name {
            fn extract_project(&self) -> Option<String> {
                #project_extraction
            }
        }
    }
}
